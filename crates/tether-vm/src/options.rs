//! Runtime configuration

/// How the interpreter walks a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Decode each instruction from its encoded word as it is reached
    Switch,
    /// Decode the whole program once and run over the decoded table
    #[default]
    Threaded,
}

impl DispatchMode {
    /// Parse `switch` or `threaded`, ignoring case
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "switch" => Some(Self::Switch),
            "threaded" => Some(Self::Threaded),
            _ => None,
        }
    }
}

/// Rounding used by `ConvertRealToInt`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingPolicy {
    /// 2.5 -> 3, -2.5 -> -3
    #[default]
    HalfAwayFromZero,
    /// 2.5 -> 2, 3.5 -> 4
    HalfToEven,
    /// 2.5 -> 3, -2.5 -> -2
    HalfUp,
}

impl RoundingPolicy {
    /// Round and saturate to `i32`; NaN becomes 0
    pub fn round(self, value: f64) -> i32 {
        let rounded = match self {
            Self::HalfAwayFromZero => value.round(),
            Self::HalfToEven => value.round_ties_even(),
            Self::HalfUp => (value + 0.5).floor(),
        };
        rounded as i32
    }
}

/// Binding runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct VmOptions {
    /// Dispatch strategy.
    /// Default: [`DispatchMode::Threaded`]
    pub dispatch: DispatchMode,

    /// Real to int rounding.
    /// Default: [`RoundingPolicy::HalfAwayFromZero`]
    pub rounding: RoundingPolicy,

    /// Queue runtime errors instead of logging them.
    /// Default: false
    pub collect_errors: bool,
}

impl VmOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TETHER_DISPATCH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dispatch = lookup("TETHER_DISPATCH")
            .and_then(|v| DispatchMode::parse(&v))
            .unwrap_or_default();
        Self {
            dispatch,
            ..Default::default()
        }
    }

    /// Set the dispatch strategy.
    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.dispatch = mode;
        self
    }

    /// Set the rounding policy.
    pub fn rounding(mut self, policy: RoundingPolicy) -> Self {
        self.rounding = policy;
        self
    }

    /// Enable or disable error collection.
    pub fn collect_errors(mut self, enabled: bool) -> Self {
        self.collect_errors = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding_policies() {
        let away = RoundingPolicy::HalfAwayFromZero;
        assert_eq!((away.round(2.5), away.round(-2.5), away.round(2.4)), (3, -3, 2));

        let even = RoundingPolicy::HalfToEven;
        assert_eq!((even.round(2.5), even.round(3.5), even.round(-2.5)), (2, 4, -2));

        let up = RoundingPolicy::HalfUp;
        assert_eq!((up.round(2.5), up.round(-2.5), up.round(-2.6)), (3, -2, -3));

        assert_eq!(away.round(f64::NAN), 0);
        assert_eq!(away.round(1e12), i32::MAX);
    }

    #[test]
    fn test_env_dispatch() {
        let switch = VmOptions::from_lookup(|_| Some("Switch".into()));
        assert_eq!(switch.dispatch, DispatchMode::Switch);
        let bogus = VmOptions::from_lookup(|_| Some("jit".into()));
        assert_eq!(bogus.dispatch, DispatchMode::Threaded);
        assert_eq!(VmOptions::from_lookup(|_| None).rounding, RoundingPolicy::HalfAwayFromZero);
    }
}
