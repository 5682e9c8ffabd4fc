//! Boundary Test Utilities
//!
//! Shared setup for end-to-end tests. Every call made through a
//! [`TestClient`] is encoded, framed, decoded by a server and executed by a
//! [`SimulatedHost`], then travels back the same way.
//!
//! ## Test Philosophy
//!
//! - **Whole path**: Tests go through the client, never straight to the host
//! - **Deterministic failures**: Host faults come from a `FaultPlan`
//! - **Inspect after**: Assertions read the simulated host's state and audit log

use host_api::{HostCallClient, HostCallCodec, HostCallServer, LoopbackTransport};
use sim_host::{Program, SimHostConfig, SimulatedHost};

/// Client wired to a simulated host through the loopback wire
pub type TestClient = HostCallClient<LoopbackTransport<SimulatedHost>>;

/// Wraps `host` behind the full client/codec/server stack. The client uses
/// the same limits as the host.
pub fn connect(host: SimulatedHost) -> TestClient {
    let limits = host.config().limits;
    let server = HostCallServer::new(host, HostCallCodec::new());
    HostCallClient::new(LoopbackTransport::new(server), HostCallCodec::new()).with_limits(limits)
}

/// Bootstrap helper for tests
///
/// Default host with the standard programs installed.
pub fn test_bootstrap() -> TestClient {
    bootstrap_with(SimHostConfig::default())
}

pub fn bootstrap_with(config: SimHostConfig) -> TestClient {
    let mut host = SimulatedHost::with_config(config);
    install_programs(&mut host);
    connect(host)
}

/// Installs:
/// - `/bin/echo`: prints `hello\n`
/// - `/bin/cat`: copies stdin to stdout
/// - `/bin/warn`: prints `oops\n` to stderr
/// - `/bin/false`: exits with 1
pub fn install_programs(host: &mut SimulatedHost) {
    host.register_program(b"/bin/echo", Program::new().with_stdout(b"hello\n"));
    host.register_program(b"/bin/cat", Program::new().copying_stdin());
    host.register_program(b"/bin/warn", Program::new().with_stderr(b"oops\n"));
    host.register_program(b"/bin/false", Program::new().with_status(1));
}

pub fn host(client: &TestClient) -> &SimulatedHost {
    client.transport().server().host()
}

pub fn host_mut(client: &mut TestClient) -> &mut SimulatedHost {
    client.transport_mut().server_mut().host_mut()
}
