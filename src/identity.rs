//! Identity matching
//!
//! Decides which configured instance a discovered modem belongs to, by
//! matching the modem's own-numbers against per-instance patterns. Matching
//! runs once per discovery, in configuration order; the first instance whose
//! matcher accepts the modem binds it.

use crate::config::InstanceConfig;
use crate::error::{Error, Result};
use crate::forward::ForwardSink;
use regex::Regex;

/// Own-number match rule. Patterns are anchored at the start of the number;
/// an absent pattern is a match-all fallback for single-instance setups.
#[derive(Debug)]
pub struct IdentityMatcher {
    pattern: Option<Regex>,
}

impl IdentityMatcher {
    pub fn new(pattern: Option<&str>) -> Result<Self> {
        let pattern = match pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| Error::Pattern {
                pattern: p.to_string(),
                source: e,
            })?),
            None => None,
        };
        Ok(Self { pattern })
    }

    /// True if any own-number matches the pattern at the start of the string,
    /// or if no pattern is configured.
    pub fn matches(&self, own_numbers: &[String]) -> bool {
        match &self.pattern {
            None => true,
            Some(re) => own_numbers
                .iter()
                .any(|n| re.find(n).map_or(false, |m| m.start() == 0)),
        }
    }
}

/// A configured logical instance: identity rule plus forwarding policy.
/// Immutable after load.
pub struct Instance {
    pub matcher: IdentityMatcher,
    pub fwd: ForwardSink,
}

impl Instance {
    pub fn from_config(conf: &InstanceConfig) -> Result<Self> {
        let pattern = conf.mid.as_ref().and_then(|m| m.n_own.as_deref());
        Ok(Self {
            matcher: IdentityMatcher::new(pattern)?,
            fwd: ForwardSink::from_config(&conf.fwd),
        })
    }
}

/// The ordered set of configured instances.
pub struct InstanceSet {
    instances: Vec<Instance>,
}

impl InstanceSet {
    pub fn from_config(configs: &[InstanceConfig]) -> Result<Self> {
        let instances = configs
            .iter()
            .map(Instance::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { instances })
    }

    /// Index of the first instance whose matcher accepts the own-numbers.
    /// Later instances are not offered the modem.
    pub fn match_modem(&self, own_numbers: &[String]) -> Option<usize> {
        self.instances
            .iter()
            .position(|i| i.matcher.matches(own_numbers))
    }

    pub fn get(&self, idx: usize) -> &Instance {
        &self.instances[idx]
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
