pub mod app_config;
pub mod config;
pub mod error;
pub mod normalize;
pub mod retailers;
pub mod targets;

pub use app_config::AppConfig;
pub use config::{load_app_config, load_app_config_from_env};
pub use error::ConfigError;
pub use normalize::{normalize_retailer, normalize_retailers};
pub use retailers::{
    load_retailers, parse_retailers, ExtractField, FieldSpec, FlowStep, RetailerConfig,
    RetailerDefinition, SelectorSource, WaitPolicy, WaitState,
};
pub use targets::Target;
