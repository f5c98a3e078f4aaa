//! The client facade.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use inferable_config::{ClientOptions, ConfigError};
use inferable_functions::{Dispatcher, Outcome, ServiceDescription};
use inferable_kernel::{
    ControlPlane, Heartbeat, HeartbeatConfig, PollConfig, Service, ServiceContext,
    ServiceDirectory,
};
use inferable_primitives::{DEFAULT_SERVICE, MachineId};
use inferable_transport::{HttpTransport, HttpTransportConfig, Transport};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::info;

use crate::error::{InferableError, InferableResult};

/// Client hosting functions for the Inferable control plane.
///
/// Construction creates the `default` service and starts a heartbeat on the
/// current `tokio` runtime. Services are started individually; call
/// [`Inferable::shutdown`] to stop them all.
pub struct Inferable {
    machine_id: MachineId,
    control_plane: ControlPlane,
    directory: Arc<ServiceDirectory>,
    default_service: Arc<Service>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl fmt::Debug for Inferable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inferable")
            .field("machine_id", &self.machine_id)
            .field("services", &self.directory.names())
            .finish_non_exhaustive()
    }
}

impl Inferable {
    /// Creates a client talking HTTP(S) to `options.api_endpoint()`.
    ///
    /// # Errors
    ///
    /// Returns [`InferableError::Config`] for invalid options,
    /// [`InferableError::Transport`] for an unusable endpoint and
    /// [`InferableError::NoRuntime`] outside a `tokio` runtime.
    pub fn new(options: ClientOptions) -> InferableResult<Self> {
        options.validate()?;
        let config = HttpTransportConfig::new(options.api_endpoint(), options.api_secret())?
            .with_timeout(options.request_timeout());
        Self::build(&options, Arc::new(HttpTransport::new(config)))
    }

    /// Creates a client from environment variables.
    ///
    /// # Errors
    ///
    /// Same as [`Inferable::new`].
    pub fn from_env() -> InferableResult<Self> {
        Self::new(ClientOptions::from_env())
    }

    /// Creates a client over a caller-supplied transport. The transport is
    /// responsible for the endpoint and credentials.
    ///
    /// # Errors
    ///
    /// Same as [`Inferable::new`].
    pub fn with_transport(
        options: ClientOptions,
        transport: Arc<dyn Transport>,
    ) -> InferableResult<Self> {
        options.validate()?;
        Self::build(&options, transport)
    }

    fn build(options: &ClientOptions, transport: Arc<dyn Transport>) -> InferableResult<Self> {
        Handle::try_current().map_err(|_| InferableError::NoRuntime)?;

        let machine_id = options.resolve_machine_id()?;
        let poll = PollConfig::new(
            non_zero("pollPageSize", options.poll_page_size())?,
            options.initial_poll_backoff(),
            non_zero("maxConsecutivePollFailures", options.max_consecutive_poll_failures())?,
        );

        let control_plane = ControlPlane::new(transport, machine_id.clone());
        let registry = Arc::default();
        let directory = Arc::new(ServiceDirectory::new(ServiceContext::new(
            control_plane.clone(),
            registry,
            poll,
        )));
        let default_service = directory.create(DEFAULT_SERVICE)?;

        let names = Arc::downgrade(&directory);
        let heartbeat = Heartbeat::spawn(
            control_plane.clone(),
            HeartbeatConfig::new(options.heartbeat_interval()),
            move || names.upgrade().map(|directory| directory.names()).unwrap_or_default(),
        );

        info!(machine_id = %machine_id, "inferable client created");
        Ok(Self {
            machine_id,
            control_plane,
            directory,
            default_service,
            heartbeat: Mutex::new(Some(heartbeat)),
        })
    }

    /// Returns the machine id sent with every request.
    #[must_use]
    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// Returns the service created at construction.
    #[must_use]
    pub fn default_service(&self) -> &Arc<Service> {
        &self.default_service
    }

    /// Creates a new named service.
    ///
    /// # Errors
    ///
    /// Returns [`InferableError::Service`] if the name is taken or invalid.
    pub fn register_service(&self, name: &str) -> InferableResult<Arc<Service>> {
        Ok(self.directory.create(name)?)
    }

    /// Returns the named service.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.directory.get(name)
    }

    /// Returns every service name, sorted.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.directory.names()
    }

    /// Invokes a registered function locally, without the control plane.
    ///
    /// # Errors
    ///
    /// Returns [`InferableError::ServiceNotFound`] for unknown services and
    /// [`InferableError::Function`] for unknown functions or bad input.
    pub fn call_func(
        &self,
        service: &str,
        function: &str,
        input: Value,
    ) -> InferableResult<Outcome> {
        if self.directory.get(service).is_none() {
            return Err(InferableError::ServiceNotFound {
                service: service.to_owned(),
            });
        }
        let dispatcher = Dispatcher::new(Arc::clone(self.directory.context().registry()));
        Ok(dispatcher.invoke(service, function, input)?)
    }

    /// Describes every service and its functions.
    #[must_use]
    pub fn definitions(&self) -> Vec<ServiceDescription> {
        self.directory.context().registry().describe_all()
    }

    /// Renders [`Inferable::definitions`] as indented JSON.
    ///
    /// # Errors
    ///
    /// Returns [`InferableError::Encode`] if encoding fails.
    pub fn to_json_definition(&self) -> InferableResult<String> {
        Ok(serde_json::to_string_pretty(&self.definitions())?)
    }

    /// Checks that the control plane is reachable and healthy.
    ///
    /// # Errors
    ///
    /// Returns [`InferableError::ControlPlane`] if `/live` fails or does not
    /// report `ok`.
    pub async fn server_ok(&self) -> InferableResult<()> {
        Ok(self.control_plane.live().await?)
    }

    /// Stops every service and the heartbeat.
    pub async fn shutdown(&self) {
        self.directory.stop_all().await;

        let heartbeat = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut heartbeat) = heartbeat {
            heartbeat.stop().await;
        }
        info!(machine_id = %self.machine_id, "inferable client shut down");
    }
}

fn non_zero(field: &'static str, value: usize) -> InferableResult<NonZeroUsize> {
    NonZeroUsize::new(value).ok_or(InferableError::Config(ConfigError::InvalidValue {
        field,
        reason: "must be greater than zero",
    }))
}
