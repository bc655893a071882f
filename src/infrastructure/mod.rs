pub mod kraken;
pub mod kraken_websocket;
pub mod mock;
