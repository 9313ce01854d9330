use thiserror::Error;

/// Error type shared by the query actions and the workbook plumbing.
///
/// Every variant is converted at the dispatch boundary into the uniform
/// `{"success": false, "error": "..."}` response, so callers never see an
/// uncaught fault. Absent or malformed request parameters are not errors at
/// all - they are silently defaulted before the query runs.
#[derive(Error, Debug)]
pub enum Error {
    /// The named sheet does not exist in the workbook.
    #[error("{0} not found")]
    SheetNotFound(String),

    /// An update targeted a record that is not in the sheet.
    #[error("record not found")]
    RecordNotFound,

    /// Filesystem failure while loading or saving the workbook.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The workbook file could not be read or is structurally unusable.
    #[error("{0}")]
    Workbook(String),

    /// The dispatched `action` parameter named no known action.
    #[error("Action not found")]
    UnknownAction,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn sheet(name: impl Into<String>) -> Self {
        Error::SheetNotFound(name.into())
    }
}
