use crate::model::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    User,
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub message: String,
}

pub const ERROR_CODE_USER_INVALID_INPUT: &str = "user.invalid_input";
pub const ERROR_CODE_USER_ADDRESS_NOT_FOUND: &str = "user.address_not_found";
pub const ERROR_CODE_USER_OUTPUT_MODE_CONFLICT: &str = "user.output_mode_conflict";
pub const ERROR_CODE_RUNTIME_GEOCODER: &str = "runtime.geocoder_failed";
pub const ERROR_CODE_RUNTIME_FORECAST: &str = "runtime.forecast_failed";
pub const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
pub const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";

impl AppError {
    pub fn user(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::User,
            code,
            message: message.into(),
        }
    }

    pub fn runtime(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::User => 2,
            ErrorKind::Runtime => 1,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ErrorKind::User => "user",
            ErrorKind::Runtime => "runtime",
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(value: ValidationError) -> Self {
        Self::user(ERROR_CODE_USER_INVALID_INPUT, value.to_string())
    }
}
