pub mod in_memory;

pub use in_memory::{
    InMemorySignalRepository, InMemoryUserSettingsRepository, InMemoryWatchConfigRepository,
};
