pub mod config;
pub mod config_loader;
pub mod events;
pub mod symbology;
pub mod traits;

pub use config::{
    AppConfig, Portfolio, StorageBackend, StorageConfig, StrategyConfig, StreamerConfig,
    TastytradeConfig,
};
pub use config_loader::ConfigLoader;
pub use events::{EventKind, GreekSnapshot, Quote, StreamEvent};
pub use symbology::{OptionRight, OptionSymbol, SymbolError};
pub use traits::{MarketDataConnector, MarketDataStream, RecordSink, SecretStore};
