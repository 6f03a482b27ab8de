// Simulation module
// Local exchange used for paper trading and candle replay

pub mod simulated_exchange;

pub use simulated_exchange::{RestingOrder, SimulatedExchange, SimulatedFill, SimulationConfig};
