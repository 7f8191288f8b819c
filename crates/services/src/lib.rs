#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod sessions;
pub mod settings;
pub mod solutions;

pub use practice_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, SessionError, SettingsError, SolutionError};
pub use sessions::{SessionListItem, SessionProgress, SessionService};
pub use settings::ServiceSettings;
pub use solutions::{HttpSolutionProvider, SolutionProvider, SolutionService};
