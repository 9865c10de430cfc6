//! Test data builders for configs and line scripts

use serialvis::AppConfig;
use std::path::PathBuf;

/// Builder for an [`AppConfig`] with timings short enough for tests
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.serial.read_timeout_ms = 10;
        config.serial.reconnect_backoff_ms = 20;
        Self { config }
    }

    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.serial.auto_reconnect = enabled;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.collection.channel_capacity = capacity;
        self
    }

    pub fn max_points(mut self, max_points: usize) -> Self {
        self.config.collection.max_points = max_points;
        self
    }

    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.collection.save_path = Some(path.into());
        self
    }

    pub fn plot(mut self, fields: &[&str]) -> Self {
        self.config.view.plot_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `HDR` line announcing `fields`
pub fn header_line(fields: &[&str]) -> String {
    format!("HDR,1,TEST,fields={},rate=100", fields.join(","))
}

/// `count` IMU-style `DAT` lines, 10 ms apart, starting at sequence 1
pub fn imu_lines(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| {
            let t = i as f64 * 10.0;
            format!("DAT,{},{:.1},{},{},9.81", i, t, i as f64 * 0.5, -(i as f64))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .reconnect(false)
            .channel_capacity(4)
            .plot(&["ax"])
            .build();
        assert!(!config.serial.auto_reconnect);
        assert_eq!(config.collection.channel_capacity, 4);
        assert_eq!(config.view.plot_fields, vec!["ax".to_string()]);
    }

    #[test]
    fn test_imu_lines() {
        let lines = imu_lines(2);
        assert_eq!(lines[0], "DAT,1,10.0,0.5,-1,9.81");
        assert_eq!(lines[1], "DAT,2,20.0,1,-2,9.81");
    }
}
