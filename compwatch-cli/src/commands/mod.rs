pub mod read;
pub mod run;
pub mod status;
pub mod sync;

/// `0.134` style millimeter cell, `-` for absent.
pub(crate) fn mm_cell(value: Option<f64>) -> String {
    match value {
        Some(mm) => format!("{mm:.3}"),
        None => "-".to_string(),
    }
}
