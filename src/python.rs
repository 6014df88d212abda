use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::core::particle::DIM;
use crate::core::{Gas, GasConfig, Particle, Wall};
use crate::stats::{SpeedHistogram, TdStats};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn to_array(particles: &[Particle], pick: impl Fn(&Particle) -> [f64; DIM]) -> Array2<f64> {
    let mut arr = Array2::<f64>::zeros((particles.len(), DIM));
    for (i, p) in particles.iter().enumerate() {
        for (k, v) in pick(p).into_iter().enumerate() {
            arr[[i, k]] = v;
        }
    }
    arr
}

/// Python-facing wrapper around [`Gas`].
///
/// - __new__(num_particles, box_side, temperature, radius=0.01, mass=1.0, seed=None)
/// - simulate(iterations) -> number of resolved events
/// - get_positions() / get_velocities() -> np.ndarray, shape (N, 3)
/// - measure(events, bins=50) -> dict of thermodynamic readouts
#[pyclass]
pub struct GasSim {
    gas: Gas,
}

#[pymethods]
impl GasSim {
    /// Place `num_particles` spheres on a lattice in a cube of side `box_side`
    /// with total kinetic energy `1.5 * num_particles * temperature`.
    ///
    /// Errors: raises ValueError on invalid parameters or if the lattice does
    /// not fit in the box.
    #[new]
    #[pyo3(signature = (num_particles, box_side, temperature, radius=0.01, mass=1.0, seed=None))]
    fn new(
        num_particles: usize,
        box_side: f64,
        temperature: f64,
        radius: f64,
        mass: f64,
        seed: Option<u64>,
    ) -> PyResult<Self> {
        let config = GasConfig::new(radius, mass).map_err(value_error)?;
        let gas = Gas::generate(num_particles, box_side, temperature, config, seed).map_err(value_error)?;
        Ok(Self { gas })
    }

    /// Resolve `iterations` collisions (releases the GIL during computation).
    fn simulate(&mut self, py: Python<'_>, iterations: usize) -> PyResult<usize> {
        let gas = &mut self.gas;
        py.detach(|| gas.simulate(iterations, None, None))
            .map_err(value_error)
    }

    /// Positions as a NumPy array of shape (N, 3), dtype=float64.
    fn get_positions(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let arr = to_array(self.gas.particles(), |p| p.position.to_array());
        Ok(arr.into_pyarray(py).to_owned().into())
    }

    /// Velocities as a NumPy array of shape (N, 3), dtype=float64.
    fn get_velocities(&self, py: Python<'_>) -> PyResult<Py<PyArray2<f64>>> {
        let arr = to_array(self.gas.particles(), |p| p.speed.to_array());
        Ok(arr.into_pyarray(py).to_owned().into())
    }

    #[getter]
    fn time(&self) -> f64 {
        self.gas.time()
    }

    fn kinetic_energy(&self) -> f64 {
        self.gas.kinetic_energy()
    }

    fn temperature(&self) -> f64 {
        self.gas.temperature()
    }

    /// Run `events` collisions into one statistics sample.
    ///
    /// Returns a dict with keys "t0", "time", "temperature", "pressure",
    /// "wall_pressures" (np.ndarray of 6), "ideal_gas_pressure",
    /// "mean_free_path" (None when no particle collided twice), "collisions",
    /// "speed_edges" and "speed_counts".
    #[pyo3(signature = (events, bins=50))]
    fn measure<'py>(
        &mut self,
        py: Python<'py>,
        events: usize,
        bins: usize,
    ) -> PyResult<Py<PyDict>> {
        if events == 0 {
            return Err(value_error("events must be > 0"));
        }
        let rms = (3.0 * self.gas.temperature() / self.gas.config().mass()).sqrt();
        let histogram = SpeedHistogram::new(bins, 4.0 * rms.max(f64::MIN_POSITIVE)).map_err(value_error)?;
        let gas = &mut self.gas;
        let stats = py
            .detach(|| -> crate::error::Result<TdStats> {
                let first = gas.step()?;
                let mut stats = TdStats::new(&first, histogram)?;
                for _ in 1..events {
                    stats.add_data(&gas.step()?)?;
                }
                Ok(stats)
            })
            .map_err(value_error)?;

        let out = PyDict::new(py);
        out.set_item("t0", stats.t0())?;
        out.set_item("time", stats.time())?;
        out.set_item("temperature", stats.temperature())?;
        out.set_item("pressure", stats.pressure())?;
        let walls: Vec<f64> = Wall::ALL.iter().map(|&w| stats.pressure_on(w)).collect();
        out.set_item("wall_pressures", PyArray1::from_vec(py, walls))?;
        out.set_item("ideal_gas_pressure", stats.ideal_gas_pressure())?;
        out.set_item("mean_free_path", stats.mean_free_path())?;
        out.set_item("collisions", stats.collision_count())?;
        let h = stats.histogram();
        out.set_item("speed_edges", PyArray1::from_vec(py, h.edges()))?;
        out.set_item("speed_counts", PyArray1::from_slice(py, h.counts()))?;
        Ok(out.into())
    }
}

#[pymodule]
fn hardgas(m: &Bound<'_, PyModule>) -> PyResult<()> {
    crate::logging::init("warn");
    m.add_class::<GasSim>()?;
    Ok(())
}
