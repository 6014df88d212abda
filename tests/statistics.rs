use hardgas::core::{Gas, GasConfig, Particle, Vec3, Wall};
use hardgas::error::{Error, Result};
use hardgas::stats::{SpeedHistogram, TdStats};

fn histogram() -> Result<SpeedHistogram> {
    SpeedHistogram::new(40, 8.0)
}

/// Chaining refuses a snapshot whose temperature differs from the chain's.
#[test]
fn temperature_mismatch_rejected() -> Result<()> {
    let config = GasConfig::new(0.1, 1.0)?;
    let mut warm = Gas::generate(8, 5.0, 1.0, config, Some(1))?;
    let mut hot = Gas::generate(8, 5.0, 4.0, config, Some(1))?;
    let stats = TdStats::new(&warm.step()?, histogram()?)?;
    let err = TdStats::chained(&stats, &hot.step()?, None).unwrap_err();
    assert!(matches!(err, Error::DataIntegrity(_)));

    let ok = TdStats::chained(&stats, &warm.step()?, None)?;
    assert_eq!(ok.temperature(), stats.temperature());
    Ok(())
}

/// A dilute gas approaches the ideal-gas pressure, and opposite walls agree.
#[test]
fn dilute_gas_pressure() -> Result<()> {
    let mut gas = Gas::generate(64, 20.0, 2.0, GasConfig::new(0.05, 1.0)?, Some(2024))?;
    let mut stats = TdStats::new(&gas.step()?, histogram()?)?;
    for _ in 0..20_000 {
        stats.add_data(&gas.step()?)?;
    }
    let ideal = stats.ideal_gas_pressure();
    let measured = stats.pressure();
    assert!(
        ((measured - ideal) / ideal).abs() < 0.15,
        "pressure {measured} vs ideal {ideal}"
    );
    let (left, right) = (stats.pressure_on(Wall::Left), stats.pressure_on(Wall::Right));
    assert!(((left - right) / ideal).abs() < 0.3, "left {left} right {right}");
    assert_eq!(stats.collision_count(), 20_001);
    assert_eq!(stats.histogram().total(), 64 * 20_001);
    Ok(())
}

/// Chained windows keep per-particle history, so free paths cross window edges.
#[test]
fn chained_windows_share_free_paths() -> Result<()> {
    let mut gas = Gas::generate(27, 6.0, 1.0, GasConfig::new(0.3, 1.0)?, Some(8))?;
    let mut first = TdStats::new(&gas.step()?, histogram()?)?;
    for _ in 0..300 {
        first.add_data(&gas.step()?)?;
    }
    let second = TdStats::chained(&first, &gas.step()?, Some(histogram()?))?;
    assert_eq!(second.t0(), first.time());
    assert_eq!(second.collision_count(), 1);
    assert_eq!(second.histogram().total(), 27);
    // every particle has collided in the first window, so the event closes a path
    assert!(second.mean_free_path().is_some());
    Ok(())
}

/// Particles moving only along x on separate lines never meet and load the
/// left and right walls equally.
#[test]
fn symmetric_wall_pressure() -> Result<()> {
    let particles = [(2.0, 2.0, 1.0), (2.0, 6.0, -1.5), (6.0, 2.0, 0.7), (6.0, 6.0, -2.2)]
        .into_iter()
        .map(|(y, z, vx)| Particle::new(Vec3::new(4.0, y, z), Vec3::new(vx, 0.0, 0.0)))
        .collect::<Result<Vec<_>>>()?;
    let mut gas = Gas::new(particles, 8.0, GasConfig::new(0.25, 1.0)?)?;
    let mut stats = TdStats::new(&gas.step()?, histogram()?)?;
    for _ in 0..4000 {
        let data = gas.step()?;
        assert!(data.is_wall_collision());
        stats.add_data(&data)?;
    }
    let (left, right) = (stats.pressure_on(Wall::Left), stats.pressure_on(Wall::Right));
    assert!(left > 0.0);
    assert!(((left - right) / left).abs() < 0.02, "left {left} right {right}");
    for wall in [Wall::Bottom, Wall::Top, Wall::Back, Wall::Front] {
        assert_eq!(stats.pressure_on(wall), 0.0);
    }
    assert!(stats.mean_free_path().is_some());
    Ok(())
}
