use std::env;

/// Helper struct to manage environment variables in tests
pub(crate) struct EnvGuard {
    saved_vars: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    pub(crate) fn new(vars: &[&str]) -> Self {
        let saved_vars = vars
            .iter()
            .map(|var| (var.to_string(), env::var(var).ok()))
            .collect();
        EnvGuard { saved_vars }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // Restore all saved environment variables
        for (key, value) in &self.saved_vars {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}
