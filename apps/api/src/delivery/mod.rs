// Outbound delivery: state machine, transport capability and the retrying dispatcher.
// Every email this service sends goes through `MailDispatcher::send`.

pub mod dispatcher;
pub mod state;
pub mod transport;
