//! Structural complexity estimate

/// Measurements a complexity estimate is built from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplexityInputs {
    /// Physical lines of the test body
    pub lines: usize,
    /// Assertions
    pub asserts: usize,
    /// Fixtures requested
    pub fixtures: usize,
    /// Parametrize layers
    pub parametrize: usize,
}

const LINES_SCALE: f64 = 500.0;
const ASSERTS_SCALE: f64 = 20.0;
const FIXTURES_SCALE: f64 = 5.0;
const PARAMETRIZE_SCALE: f64 = 3.0;

/// Weighted, saturating estimate in `[0, 1]`
pub fn complexity(inputs: ComplexityInputs) -> f64 {
    let raw = inputs.lines as f64 / LINES_SCALE * 0.4
        + inputs.asserts as f64 / ASSERTS_SCALE * 0.3
        + inputs.fixtures as f64 / FIXTURES_SCALE * 0.2
        + inputs.parametrize as f64 / PARAMETRIZE_SCALE * 0.1;
    raw.clamp(0.0, 1.0)
}
