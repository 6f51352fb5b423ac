pub mod candles;

pub use candles::HttpCandleClient;
