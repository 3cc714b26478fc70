pub mod aggregate;
pub mod catalog;
pub mod feed;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod polyline;
pub mod wire;
