pub mod mock_fetcher;
pub mod mock_gateway;
pub mod mock_probe;

pub use mock_fetcher::ScriptedFetcher;
pub use mock_gateway::{MockGateway, Scripted};
pub use mock_probe::ScriptedProbe;
