//! Ordered configuration mutators.
//!
//! Clients and servers are assembled by applying a list of [`Opt`] values to a
//! mutable target. Each option is a named closure that edits the target in
//! place and may fail. [`build`] applies the factory's default list first and
//! the caller's list second, so the last write to a field wins.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use brisk_core::{build, Opt};
//!
//! #[derive(Default)]
//! struct Target {
//!     timeout: Duration,
//! }
//!
//! fn with_timeout(d: Duration) -> Opt<Target> {
//!     Opt::new("timeout", move |t: &mut Target| {
//!         t.timeout = d;
//!         Ok(())
//!     })
//! }
//!
//! let defaults = [with_timeout(Duration::from_secs(2))];
//! let target = build(Target::default(), &defaults, [with_timeout(Duration::from_secs(5))]).unwrap();
//! assert_eq!(target.timeout, Duration::from_secs(5));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::ConfigResult;

type ApplyFn<T> = dyn Fn(&mut T) -> ConfigResult<()> + Send + Sync;

/// A named mutation of a configuration target.
///
/// Options are cheap to clone, so a default list can be kept around and
/// applied to many targets.
pub struct Opt<T> {
    name: &'static str,
    apply: Arc<ApplyFn<T>>,
}

impl<T> Opt<T> {
    /// Creates an option from a name and a mutation closure.
    pub fn new<F>(name: &'static str, apply: F) -> Self
    where
        F: Fn(&mut T) -> ConfigResult<()> + Send + Sync + 'static,
    {
        Self {
            name,
            apply: Arc::new(apply),
        }
    }

    /// Returns the option's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Applies the option to `target`.
    pub fn apply(&self, target: &mut T) -> ConfigResult<()> {
        (self.apply)(target)
    }
}

impl<T> Clone for Opt<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T> fmt::Debug for Opt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt").field("name", &self.name).finish()
    }
}

/// Applies `defaults` and then `overrides` to `target`.
///
/// The first failing option stops construction. Its error is returned and the
/// partially configured target is dropped.
pub fn build<T, I>(mut target: T, defaults: &[Opt<T>], overrides: I) -> ConfigResult<T>
where
    I: IntoIterator<Item = Opt<T>>,
{
    for opt in defaults {
        apply_one(opt, &mut target)?;
    }
    for opt in overrides {
        apply_one(&opt, &mut target)?;
    }
    Ok(target)
}

fn apply_one<T>(opt: &Opt<T>, target: &mut T) -> ConfigResult<()> {
    opt.apply(target).map_err(|err| {
        tracing::debug!(option = opt.name(), error = %err, "option rejected");
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use proptest::prelude::*;

    #[derive(Debug, Default)]
    struct Target {
        value: u64,
        applied: Vec<&'static str>,
    }

    fn set(name: &'static str, value: u64) -> Opt<Target> {
        Opt::new(name, move |t: &mut Target| {
            t.value = value;
            t.applied.push(name);
            Ok(())
        })
    }

    fn fail(name: &'static str) -> Opt<Target> {
        Opt::new(name, |_: &mut Target| {
            Err(ConfigError::invalid_value("value", "rejected"))
        })
    }

    #[test]
    fn test_defaults_then_overrides_in_order() {
        let defaults = [set("a", 1), set("b", 2)];
        let target = build(Target::default(), &defaults, [set("c", 3), set("d", 4)]).unwrap();

        assert_eq!(target.applied, vec!["a", "b", "c", "d"]);
        assert_eq!(target.value, 4);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let defaults = [set("a", 7)];
        let target = build(Target::default(), &defaults, Vec::new()).unwrap();
        assert_eq!(target.value, 7);
    }

    #[test]
    fn test_first_error_stops_application() {
        let defaults = [set("a", 1)];
        let result = build(Target::default(), &defaults, [fail("bad"), set("late", 9)]);

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "value", .. })
        ));
    }

    #[test]
    fn test_failing_default_aborts_before_overrides() {
        let defaults = [fail("bad-default")];
        let result = build(Target::default(), &defaults, [set("a", 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_clone_shares_closure() {
        let opt = set("shared", 5);
        let copy = opt.clone();
        assert_eq!(copy.name(), "shared");
        assert_eq!(format!("{copy:?}"), "Opt { name: \"shared\" }");

        let mut target = Target::default();
        copy.apply(&mut target).unwrap();
        assert_eq!(target.value, 5);
    }

    proptest! {
        #[test]
        fn prop_override_always_wins(default in any::<u64>(), overrides in prop::collection::vec(any::<u64>(), 1..8)) {
            let defaults = [set("default", default)];
            let opts: Vec<_> = overrides.iter().map(|v| set("override", *v)).collect();
            let target = build(Target::default(), &defaults, opts).unwrap();
            prop_assert_eq!(target.value, *overrides.last().unwrap());
        }
    }
}
