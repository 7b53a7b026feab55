use thiserror::Error;

#[derive(Error, Debug)]
pub enum SousError {
    #[error("Unauthorized: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse recipe JSON: {0}")]
    Parse(String),

    #[error("Recipe is missing required fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SousError {
    fn from(e: reqwest::Error) -> Self {
        SousError::Network(e.to_string())
    }
}

impl SousError {
    /// Message shown to the person at the keyboard. Internal details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            SousError::Auth(_) => "Unauthorized".to_string(),
            SousError::Forbidden(_) => "You are not allowed to change this recipe.".to_string(),
            SousError::Network(msg) => format!("{msg} Please try again."),
            SousError::Parse(_) => {
                "The AI response couldn't be understood. Please try again.".to_string()
            }
            SousError::MissingFields { .. } | SousError::InvalidInput(_) | SousError::NotFound(_) => {
                self.to_string()
            }
            SousError::Persistence(_) | SousError::Database(_) => {
                "Error saving recipe. Please try again.".to_string()
            }
            SousError::Config(_) | SousError::Io(_) | SousError::Other(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SousError::Network(_))
    }
}
