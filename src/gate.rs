use park_waits_config::WindowSettings;

/// Daily hour range in which collection runs. `start_hour..=end_hour`: the end hour itself is inside the
/// window, so with the default `9..=21` a cycle at 21:45 still collects and one at 22:00 does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    start_hour: u32,
    end_hour: u32,
}

impl OperatingWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self { start_hour, end_hour }
    }

    pub fn permits(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }
}

impl From<WindowSettings> for OperatingWindow {
    fn from(settings: WindowSettings) -> Self {
        Self::new(settings.start_hour, settings.end_hour)
    }
}

impl std::fmt::Display for OperatingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:59", self.start_hour, self.end_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_bounds_are_inclusive() {
        let window = OperatingWindow::new(9, 21);
        assert!(!window.permits(8));
        assert!(window.permits(9));
        assert!(window.permits(15));
        assert!(window.permits(21));
        assert!(!window.permits(22));
        assert!(!window.permits(0));
    }

    #[test]
    fn single_hour_window() {
        let window = OperatingWindow::new(12, 12);
        assert!(window.permits(12));
        assert!(!window.permits(11));
        assert!(!window.permits(13));
    }

    #[test]
    fn displays_as_clock_range() {
        assert_eq!(OperatingWindow::new(9, 21).to_string(), "09:00-21:59");
    }
}
