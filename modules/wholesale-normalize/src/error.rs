use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("raw record is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("normalized product failed validation: {0}")]
    Invalid(String),
}
