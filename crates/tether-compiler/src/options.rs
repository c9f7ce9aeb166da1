//! Compiler configuration

use tether_object::PropertyInfo;

use crate::scope::Destination;

/// What to do when one binding names the same subscription twice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateSubscriptions {
    /// Refuse the binding
    #[default]
    Reject,
    /// Reuse the first subscription and emit no second subscribe
    Share,
}

/// A condition under which the compiled path is not used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRule {
    /// Fetching a property introduced in a later API revision
    RevisionedProperty,
    /// Writing a field of a value-type property outside experimental mode
    ValueTypeSubPropertyNeedsExperimental,
}

impl PropertyRule {
    /// Whether this rule refuses a fetch of `property`
    pub fn rejects_fetch(self, property: &PropertyInfo) -> bool {
        match self {
            Self::RevisionedProperty => property.revision > 0,
            Self::ValueTypeSubPropertyNeedsExperimental => false,
        }
    }

    /// Whether this rule refuses writing `destination`
    pub fn rejects_destination(self, destination: &Destination, experimental: bool) -> bool {
        match self {
            Self::RevisionedProperty => false,
            Self::ValueTypeSubPropertyNeedsExperimental => {
                destination.value_type_sub_property && !experimental
            }
        }
    }
}

/// Binding compiler configuration.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Allow dynamic lookups, generic conversions and value-type field destinations.
    /// Default: false
    pub experimental: bool,

    /// Reject every binding.
    /// Default: false
    pub disable_optimizer: bool,

    /// Never use the fast-accessor table.
    /// Default: false
    pub disable_fast_properties: bool,

    /// Mark each binding with its source position and log the program on assembly.
    /// Default: false
    pub bindings_dump: bool,

    /// Duplicate subscription handling.
    /// Default: [`DuplicateSubscriptions::Reject`]
    pub duplicate_subscriptions: DuplicateSubscriptions,

    /// Rules that turn the compiled path off for particular properties.
    pub property_rules: Vec<PropertyRule>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            experimental: false,
            disable_optimizer: false,
            disable_fast_properties: false,
            bindings_dump: false,
            duplicate_subscriptions: DuplicateSubscriptions::Reject,
            property_rules: vec![
                PropertyRule::RevisionedProperty,
                PropertyRule::ValueTypeSubPropertyNeedsExperimental,
            ],
        }
    }
}

impl CompilerOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with experimental mode on.
    pub fn experimental_mode() -> Self {
        Self {
            experimental: true,
            ..Default::default()
        }
    }

    /// Defaults overridden by `TETHER_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| !v.is_empty() && v != "0");
        Self {
            experimental: flag("TETHER_EXPERIMENTAL"),
            disable_optimizer: flag("TETHER_DISABLE_OPTIMIZER"),
            disable_fast_properties: flag("TETHER_DISABLE_FAST_PROPERTIES"),
            bindings_dump: flag("TETHER_BINDINGS_DUMP"),
            ..Default::default()
        }
    }

    /// Enable or disable experimental mode.
    pub fn experimental(mut self, enabled: bool) -> Self {
        self.experimental = enabled;
        self
    }

    /// Enable or disable the optimizer.
    pub fn optimizer(mut self, enabled: bool) -> Self {
        self.disable_optimizer = !enabled;
        self
    }

    /// Enable or disable fast property access.
    pub fn fast_properties(mut self, enabled: bool) -> Self {
        self.disable_fast_properties = !enabled;
        self
    }

    /// Enable or disable binding dumps.
    pub fn bindings_dump(mut self, enabled: bool) -> Self {
        self.bindings_dump = enabled;
        self
    }

    /// Set duplicate subscription handling.
    pub fn duplicate_subscriptions(mut self, mode: DuplicateSubscriptions) -> Self {
        self.duplicate_subscriptions = mode;
        self
    }

    /// Add a property rule.
    pub fn rule(mut self, rule: PropertyRule) -> Self {
        if !self.property_rules.contains(&rule) {
            self.property_rules.push(rule);
        }
        self
    }

    /// Replace the property rule table.
    pub fn rules(mut self, rules: Vec<PropertyRule>) -> Self {
        self.property_rules = rules;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flags() {
        let options = CompilerOptions::from_lookup(|name| match name {
            "TETHER_EXPERIMENTAL" => Some("1".into()),
            "TETHER_DISABLE_OPTIMIZER" => Some("0".into()),
            "TETHER_BINDINGS_DUMP" => Some(String::new()),
            _ => None,
        });
        assert!(options.experimental);
        assert!(!options.disable_optimizer);
        assert!(!options.bindings_dump);
        assert_eq!(options.property_rules.len(), 2);
    }

    #[test]
    fn test_value_type_rule() {
        let dest = Destination::value_type_field(0, tether_object::PropertyType::Real);
        let rule = PropertyRule::ValueTypeSubPropertyNeedsExperimental;
        assert!(rule.rejects_destination(&dest, false));
        assert!(!rule.rejects_destination(&dest, true));
        assert!(!PropertyRule::RevisionedProperty.rejects_destination(&dest, false));
    }
}
