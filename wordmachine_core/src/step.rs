pub mod step {
    /// step returns whether the machine should keep running.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum StepOutcome {
        Continue,
        Halted,
    }
}
