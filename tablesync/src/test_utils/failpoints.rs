use fail::FailScenario;

/// Activates failpoints for the lifetime of the value.
///
/// Holds the global [`FailScenario`] lock, so tests configuring failpoints run one at a time.
pub struct FailpointGuard<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> FailpointGuard<'a> {
    /// Configures each `(failpoint, action)` pair, e.g. `("execute_plan.before_apply", "1*return(lock_timeout)")`.
    ///
    /// # Panics
    /// Panics if an action cannot be parsed.
    pub fn setup(failpoints: &[(&str, &str)]) -> FailpointGuard<'a> {
        let scenario = FailScenario::setup();

        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).expect("Invalid failpoint action");
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints.iter().map(|(name, _)| name.to_string()).collect(),
        }
    }
}

impl Drop for FailpointGuard<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            fail::remove(failpoint);
        }
    }
}
