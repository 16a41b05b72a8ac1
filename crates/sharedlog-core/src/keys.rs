/// Maps integer key ids to store keys.
pub trait KeyGenerator: Send + Sync + 'static {
    fn generate_key(&self, key_id: i64) -> String;
}

/// Key id holding the backup copy of a slot.
pub fn backup_key_id(key_id: i64) -> i64 {
    !key_id
}

/// Formats keys as `<prefix><key_id>`.
#[derive(Debug, Clone)]
pub struct PrefixKeyGenerator {
    prefix: String,
}

impl PrefixKeyGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        PrefixKeyGenerator {
            prefix: prefix.into(),
        }
    }
}

impl Default for PrefixKeyGenerator {
    fn default() -> Self {
        Self::new("key_")
    }
}

impl KeyGenerator for PrefixKeyGenerator {
    fn generate_key(&self, key_id: i64) -> String {
        format!("{}{}", self.prefix, key_id)
    }
}
