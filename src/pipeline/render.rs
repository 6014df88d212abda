use crate::data::GasData;
use crate::error::Result;

/// Turns a physical snapshot into an opaque frame.
///
/// Camera and style belong to the implementor. `dt` is the look-ahead from the
/// snapshot's clock to the frame instant, so particles can be extrapolated
/// ballistically. Implementations must be deterministic and must not keep
/// references to the snapshot.
pub trait Renderer<F>: Sync {
    fn render(&self, snapshot: &GasData, dt: f64) -> Result<F>;
}

impl<F, T> Renderer<F> for T
where
    T: Fn(&GasData, f64) -> Result<F> + Sync,
{
    fn render(&self, snapshot: &GasData, dt: f64) -> Result<F> {
        self(snapshot, dt)
    }
}

/// Frames produced for one batch and the next grid index to render.
pub(crate) struct RenderedBatch<F> {
    pub frames: Vec<(F, f64)>,
    pub next_index: u64,
}

/// Resample `batch` onto the grid `origin + k * period`, starting at `first_index`.
///
/// Each grid instant up to the batch's last event time gets the nearest
/// preceding snapshot (`previous` covers instants before the batch's first
/// event). Instants with no preceding snapshot at all are skipped. Without a
/// renderer only the grid index advances.
pub(crate) fn render_batch<F>(
    renderer: Option<&dyn Renderer<F>>,
    batch: &[GasData],
    previous: Option<&GasData>,
    origin: f64,
    period: f64,
    first_index: u64,
) -> Result<RenderedBatch<F>> {
    let mut frames = Vec::new();
    let mut k = first_index;
    let Some(end) = batch.last().map(GasData::time) else {
        return Ok(RenderedBatch {
            frames,
            next_index: k,
        });
    };

    loop {
        let t = origin + k as f64 * period;
        if t > end {
            break;
        }
        if let Some(renderer) = renderer {
            let idx = batch.partition_point(|d| d.time() <= t);
            let snapshot = if idx > 0 { Some(&batch[idx - 1]) } else { previous };
            if let Some(s) = snapshot {
                frames.push((renderer.render(s, t - s.time())?, t));
            }
        }
        k += 1;
    }
    Ok(RenderedBatch {
        frames,
        next_index: k,
    })
}
