//! Debug telemetry sink: a polar plot of `(angle, frequency)`.
//!
//! Rendered as an SVG file the operator keeps open in a viewer; 0° sits at
//! the top and angles grow clockwise, matching the stage as seen from the
//! audience. The radial axis is the drive frequency, capped at
//! `max_frequency`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use plotters::prelude::*;
use tracing::debug;

use crate::message::TelemetryFrame;
use crate::{Error, Result};

/// How many telemetry points the trace keeps
const TRACE_LEN: usize = 20;
/// Re-render cap
const RENDER_INTERVAL: Duration = Duration::from_secs(1);

/// Rolling rotation trace with SVG rendering.
pub struct RotationPlot {
    points: VecDeque<(f64, f64)>,
    max_frequency: f64,
    path: String,
    last_render: Option<Instant>,
}

impl RotationPlot {
    /// Creates a plot that renders to `path`.
    pub fn new(path: &str, max_frequency: f64) -> Self {
        Self {
            points: VecDeque::with_capacity(TRACE_LEN),
            max_frequency,
            path: path.to_owned(),
            last_render: None,
        }
    }

    /// Appends a telemetry frame and re-renders at most once per second.
    pub fn push(&mut self, frame: TelemetryFrame) {
        if self.points.len() == TRACE_LEN {
            self.points.pop_front();
        }
        self.points
            .push_back((frame.angle_rad, frame.frequency.abs()));
        let due = self
            .last_render
            .map_or(true, |t| t.elapsed() >= RENDER_INTERVAL);
        if due {
            if let Err(e) = self.render() {
                debug!(error = %e, "rotation plot render failed");
            }
            self.last_render = Some(Instant::now());
        }
    }

    /// Maps polar stage coordinates (clockwise, 0° up) to the chart plane.
    fn to_xy(theta: f64, r: f64) -> (f64, f64) {
        (r * theta.sin(), r * theta.cos())
    }

    fn render(&self) -> Result<()> {
        let root = SVGBackend::new(&self.path, (480, 480)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        let limit = self.max_frequency;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(-limit..limit, -limit..limit)
            .map_err(plot_err)?;

        // ring grid at quarter steps of the frequency range
        for step in 1..=4 {
            let r = limit * f64::from(step) / 4.0;
            chart
                .draw_series(LineSeries::new(
                    (0..=360).map(|d| Self::to_xy(f64::from(d).to_radians(), r)),
                    &BLACK.mix(0.15),
                ))
                .map_err(plot_err)?;
        }
        chart
            .draw_series(LineSeries::new(
                self.points.iter().map(|&(theta, r)| Self::to_xy(theta, r)),
                &RED,
            ))
            .map_err(plot_err)?;
        root.present().map_err(plot_err)?;
        Ok(())
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Failed(format!("plot: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_is_capped() {
        let dir = std::env::temp_dir().join("rsc-plot-test.svg");
        let mut plot = RotationPlot::new(dir.to_str().unwrap(), 40.0);
        for i in 0..50 {
            plot.push(TelemetryFrame {
                angle_rad: f64::from(i) * 0.1,
                frequency: 10.0,
            });
        }
        assert_eq!(plot.points.len(), TRACE_LEN);
        assert!(dir.exists());
        let _ = std::fs::remove_file(dir);
    }
}
