//! Locally generated dolphin ids.

/// Default prefix for generated dolphin ids.
pub const DEFAULT_DOLPHIN_ID_PREFIX: &str = "spectate-manager-";

/// Produces `<prefix><ordinal>` ids, ordinal starting at 0.
///
/// One generator lives for one connected session; a reconnect starts over.
#[derive(Clone, Debug)]
pub struct DolphinIdGenerator {
    prefix: String,
    next: u64,
}

impl DolphinIdGenerator {
    /// Create a generator with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    /// Next id for which `in_use` is false.
    pub fn next_id(&mut self, in_use: impl Fn(&str) -> bool) -> String {
        loop {
            let id = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !in_use(&id) {
                return id;
            }
        }
    }
}

impl Default for DolphinIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_DOLPHIN_ID_PREFIX)
    }
}
