use colored::{Color, Colorize};
use ems::types::{ConsumptionResponse, Device, UnitEnergy};

const BAR_WIDTH: f64 = 40.0;

/// Color of one hourly bar relative to the device's rated maximum.
fn load_color(value: f64, max: Option<f64>) -> Color {
    let Some(max) = max.filter(|max| *max > 0.0) else {
        return Color::Blue;
    };
    match value / max {
        ratio if ratio >= 0.9 => Color::Red,
        ratio if ratio >= 0.6 => Color::Yellow,
        _ => Color::Green,
    }
}

/// Values arrive in kWh.
fn scaled(value: f64, unit: UnitEnergy) -> f64 {
    match unit {
        UnitEnergy::Kwh => value,
        UnitEnergy::Wh => value * 1000.0,
    }
}

pub fn render(consumption: &ConsumptionResponse, device: Option<&Device>, unit: UnitEnergy) -> String {
    let peak = consumption
        .points
        .iter()
        .map(|point| point.value)
        .fold(0.0_f64, f64::max);
    let max = device.map(|device| f64::from(device.max_consumption));
    let label = device.map_or(consumption.device_id.as_str(), |device| device.name.as_str());

    let mut lines = vec![format!("{label} on {}", consumption.day).bold().to_string()];
    for point in &consumption.points {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let width = if peak > 0.0 {
            ((point.value / peak) * BAR_WIDTH).round() as usize
        } else {
            0
        };
        let bar = "█".repeat(width).color(load_color(point.value, max));
        lines.push(format!(
            "{:02}:00 {bar} {:.2}",
            point.hour,
            scaled(point.value, unit)
        ));
    }
    lines.push(format!(
        "total {:.2} {unit}",
        scaled(consumption.total(), unit)
    ));
    lines.join("\n")
}
