//! Register (result handle) naming

use std::collections::HashMap;

/// Hands out unique register names, `<prefix>_<key>_<n>`. Counters start at 1
/// and are never reset for the lifetime of the allocator.
#[derive(Debug, Clone, Default)]
pub struct RegisterAllocator {
    prefix: Option<String>,
    counters: HashMap<String, u32>,
}

impl RegisterAllocator {
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()),
            counters: HashMap::new(),
        }
    }

    pub fn allocate(&mut self, key: &str) -> String {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        match &self.prefix {
            Some(prefix) => format!("{}_{}_{}", prefix, key, counter),
            None => format!("{}_{}", key, counter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_per_key() {
        let mut registers = RegisterAllocator::default();
        assert_eq!(registers.allocate("mkdir"), "mkdir_1");
        assert_eq!(registers.allocate("mkdir"), "mkdir_2");
        assert_eq!(registers.allocate("copy_file"), "copy_file_1");
    }

    #[test]
    fn test_prefix() {
        let mut registers = RegisterAllocator::new(Some("webserver".to_string()));
        assert_eq!(registers.allocate("touch"), "webserver_touch_1");
    }

    #[test]
    fn test_empty_prefix_ignored() {
        let mut registers = RegisterAllocator::new(Some(String::new()));
        assert_eq!(registers.allocate("touch"), "touch_1");
    }
}
