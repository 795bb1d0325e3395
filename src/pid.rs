//! Discrete PID controller.
//!
//! Proportional on error, integral with output-range clamping, derivative on
//! measurement (kick-free on setpoint changes). An optional sample time
//! makes repeated updates within one period return the previous output
//! unchanged, and the auto-mode toggle re-arms the integral from a seed
//! output so a re-engaged loop starts from the last actuator state instead
//! of zero.
//!
//! The clock is passed into [`Pid::update_at`] so control behavior is
//! reproducible in tests.

use std::time::{Duration, Instant};

/// A discrete PID controller with output clamping.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    sample_time: Option<Duration>,
    out_min: f64,
    out_max: f64,
    auto_mode: bool,
    integral: f64,
    last_output: Option<f64>,
    last_input: Option<f64>,
    last_time: Option<Instant>,
}

impl Pid {
    /// Creates a controller with the given gains, no output limits, no
    /// sample time, auto mode on.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint: 0.0,
            sample_time: None,
            out_min: f64::NEG_INFINITY,
            out_max: f64::INFINITY,
            auto_mode: true,
            integral: 0.0,
            last_output: None,
            last_input: None,
            last_time: None,
        }
    }
    /// Sets the sample time (build pattern)
    pub fn with_sample_time(mut self, sample_time: Duration) -> Self {
        self.sample_time = Some(sample_time);
        self
    }
    /// Sets the output limits (build pattern)
    pub fn with_output_limits(mut self, min: f64, max: f64) -> Self {
        self.set_output_limits(min, max);
        self
    }
    /// Current setpoint
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }
    /// Sets the setpoint
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }
    /// Sets the output limits; the integral and the last output are clamped
    /// into the new range
    pub fn set_output_limits(&mut self, min: f64, max: f64) {
        self.out_min = min;
        self.out_max = max;
        self.integral = self.clamp(self.integral);
        if let Some(out) = self.last_output {
            self.last_output = Some(self.clamp(out));
        }
    }
    /// Toggles auto mode. Turning it on re-arms the controller: the
    /// integral is seeded with `seed` (clamped to the output range) and the
    /// next update starts a fresh differentiation window.
    pub fn set_auto_mode(&mut self, enabled: bool, seed: Option<f64>) {
        if enabled && !self.auto_mode {
            self.integral = self.clamp(seed.unwrap_or(0.0));
            self.last_input = None;
            self.last_time = None;
        }
        self.auto_mode = enabled;
    }
    /// True while the controller is computing
    pub fn auto_mode(&self) -> bool {
        self.auto_mode
    }
    /// Computes the control output for a measurement taken now.
    pub fn update(&mut self, input: f64) -> Option<f64> {
        self.update_at(input, Instant::now())
    }
    /// Computes the control output for a measurement taken at `now`.
    ///
    /// In manual mode, or within one sample time of the previous update,
    /// the previous output is returned unchanged. Returns `None` only
    /// before the very first computation.
    pub fn update_at(&mut self, input: f64, now: Instant) -> Option<f64> {
        if !self.auto_mode {
            return self.last_output;
        }
        let dt = self
            .last_time
            .map(|t| now.saturating_duration_since(t));
        if let (Some(sample_time), Some(dt), Some(out)) = (self.sample_time, dt, self.last_output)
        {
            if dt < sample_time {
                return Some(out);
            }
        }
        // first update has no meaningful dt; integral and derivative kick in
        // from the second one
        let dt_s = dt.map_or(0.0, |d| d.as_secs_f64());
        let error = self.setpoint - input;
        let d_input = self.last_input.map_or(0.0, |last| input - last);

        let proportional = self.kp * error;
        self.integral = self.clamp(self.integral + self.ki * error * dt_s);
        let derivative = if dt_s > 0.0 {
            -self.kd * d_input / dt_s
        } else {
            0.0
        };

        let output = self.clamp(proportional + self.integral + derivative);
        self.last_output = Some(output);
        self.last_input = Some(input);
        self.last_time = Some(now);
        Some(output)
    }
    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.out_min, self.out_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pure_proportional() {
        let mut pid = Pid::new(2.0, 0.0, 0.0);
        pid.set_setpoint(10.0);
        let out = pid.update_at(4.0, Instant::now()).unwrap();
        assert!((out - 12.0).abs() < 1e-12);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = Pid::new(10.0, 0.0, 0.0).with_output_limits(-1.0, 1.0);
        pid.set_setpoint(100.0);
        assert_eq!(pid.update_at(0.0, Instant::now()), Some(1.0));
        pid.set_setpoint(-100.0);
        assert_eq!(pid.update_at(0.0, Instant::now()), Some(-1.0));
    }

    #[test]
    fn integral_accumulates_over_time() {
        let mut pid = Pid::new(0.0, 1.0, 0.0);
        pid.set_setpoint(1.0);
        let t0 = Instant::now();
        pid.update_at(0.0, t0);
        // 10 × 100 ms with constant error 1.0 → integral ≈ 1.0
        let mut out = 0.0;
        for i in 1..=10 {
            out = pid
                .update_at(0.0, t0 + Duration::from_millis(100 * i))
                .unwrap();
        }
        assert!((out - 1.0).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn derivative_opposes_input_change() {
        let mut pid = Pid::new(0.0, 0.0, 1.0);
        pid.set_setpoint(0.0);
        let t0 = Instant::now();
        pid.update_at(0.0, t0);
        let out = pid.update_at(1.0, t0 + Duration::from_secs(1)).unwrap();
        assert!((out + 1.0).abs() < 1e-9, "got {out}");
    }

    #[test]
    fn sample_time_holds_the_previous_output() {
        let mut pid = Pid::new(1.0, 0.0, 0.0).with_sample_time(Duration::from_millis(100));
        pid.set_setpoint(5.0);
        let t0 = Instant::now();
        let first = pid.update_at(0.0, t0).unwrap();
        // 10 ms later: inside the sample window, output unchanged
        let held = pid
            .update_at(100.0, t0 + Duration::from_millis(10))
            .unwrap();
        assert_eq!(first, held);
        // past the window the new measurement is used
        let fresh = pid
            .update_at(4.0, t0 + Duration::from_millis(150))
            .unwrap();
        assert!((fresh - 1.0).abs() < 1e-9);
    }

    #[test]
    fn manual_mode_freezes_the_output() {
        let mut pid = Pid::new(1.0, 0.0, 0.0);
        pid.set_setpoint(1.0);
        let t0 = Instant::now();
        let out = pid.update_at(0.0, t0).unwrap();
        pid.set_auto_mode(false, None);
        assert_eq!(pid.update_at(100.0, t0 + Duration::from_secs(1)), Some(out));
    }

    #[test]
    fn re_arming_seeds_the_integral() {
        let mut pid = Pid::new(0.0, 0.5, 0.0).with_output_limits(-10.0, 10.0);
        pid.set_setpoint(0.0);
        pid.set_auto_mode(false, None);
        pid.set_auto_mode(true, Some(4.0));
        let t0 = Instant::now();
        // error is zero, so the output is exactly the seeded integral
        let out = pid.update_at(0.0, t0).unwrap();
        assert!((out - 4.0).abs() < 1e-12);
        // seed is clamped into the output range
        pid.set_auto_mode(false, None);
        pid.set_auto_mode(true, Some(100.0));
        let out = pid.update_at(0.0, t0 + Duration::from_secs(1)).unwrap();
        assert!((out - 10.0).abs() < 1e-12);
    }
}
