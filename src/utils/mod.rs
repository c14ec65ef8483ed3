pub mod configuration;
pub mod external_process;
pub mod format_writers;
pub mod intermediate_output;
pub mod interrupt;

pub use configuration::{ConfigurationManager, PipelineConfiguration};
pub use external_process::ExternalCommand;
pub use intermediate_output::RunLayout;
pub use interrupt::{interrupt_channel, listen_for_signals, InterruptSignal};
