//! Services: named groups of functions with their own handshake and poll loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use inferable_functions::{
    Dispatcher, Function, FunctionDescription, FunctionError, FunctionRegistry,
};
use futures::future::join_all;
use inferable_primitives::validate_service_name;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::lifecycle::{Lifecycle, LifecycleError, LifecycleEvent, ServiceState};
use crate::poller::{LoopExit, PollConfig, PollError, Poller, drive_poll_loop};
use crate::wire::RegisterMachineRequest;

/// Result alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// `start` was called before any function was registered.
    #[error("cannot register service '{service}': no functions registered")]
    NoFunctions {
        /// Service name.
        service: String,
    },

    /// `start` was called while the service was registering or polling.
    #[error("service '{service}' is already running ({state:?})")]
    AlreadyRunning {
        /// Service name.
        service: String,
        /// State observed when the call was rejected.
        state: ServiceState,
    },

    /// A service with this name already exists in the directory.
    #[error("service with name '{service}' already registered")]
    DuplicateService {
        /// Service name.
        service: String,
    },

    /// Function registration failed.
    #[error(transparent)]
    Function(#[from] FunctionError),

    /// The machine handshake failed.
    #[error("failed to register machine for service '{service}': {source}")]
    Handshake {
        /// Service name.
        service: String,
        /// Underlying control-plane error.
        #[source]
        source: ControlPlaneError,
    },

    /// Poll configuration was rejected.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Collaborators shared by every service of a client.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    control_plane: ControlPlane,
    registry: Arc<FunctionRegistry>,
    poll: PollConfig,
}

impl ServiceContext {
    /// Bundles the control-plane client, shared registry and poll tuning.
    #[must_use]
    pub fn new(
        control_plane: ControlPlane,
        registry: Arc<FunctionRegistry>,
        poll: PollConfig,
    ) -> Self {
        Self {
            control_plane,
            registry,
            poll,
        }
    }

    /// Returns the control-plane client.
    #[must_use]
    pub fn control_plane(&self) -> &ControlPlane {
        &self.control_plane
    }

    /// Returns the shared function registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Returns the poll tuning.
    #[must_use]
    pub const fn poll(&self) -> PollConfig {
        self.poll
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<LoopExit>,
}

/// A named group of functions polled as one unit.
pub struct Service {
    name: String,
    context: ServiceContext,
    lifecycle: Arc<Mutex<Lifecycle>>,
    cluster_id: Mutex<Option<String>>,
    running: Mutex<Option<Running>>,
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cluster_id", &self.cluster_id())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Service {
    /// Creates an unregistered service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Function`] if the name is invalid.
    pub fn new(name: impl Into<String>, context: ServiceContext) -> ServiceResult<Self> {
        let name = name.into();
        context
            .registry
            .add_service(&name)
            .map_err(ServiceError::Function)?;
        Ok(Self {
            lifecycle: Arc::new(Mutex::new(Lifecycle::new(name.clone()))),
            name,
            context,
            cluster_id: Mutex::new(None),
            running: Mutex::new(None),
        })
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        lock(&self.lifecycle).state()
    }

    /// Returns `true` while the poll loop is running.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.state() == ServiceState::Polling
    }

    /// Returns the cluster id negotiated by the last successful handshake.
    #[must_use]
    pub fn cluster_id(&self) -> Option<String> {
        lock(&self.cluster_id).clone()
    }

    /// Registers a function with this service.
    ///
    /// Functions added after [`Service::start`] are dispatched but not
    /// announced until the next start.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Function`] for duplicate names or unsupported
    /// input types.
    pub fn register_func(&self, function: Function) -> ServiceResult<()> {
        self.context.registry.register(&self.name, function)?;
        Ok(())
    }

    /// Describes the registered functions, sorted by name.
    #[must_use]
    pub fn describe(&self) -> Vec<FunctionDescription> {
        self.context.registry.describe(&self.name)
    }

    /// Returns the number of registered functions.
    #[must_use]
    pub fn function_count(&self) -> usize {
        self.context.registry.function_count(&self.name)
    }

    /// Announces the service and starts polling for calls.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NoFunctions`] if nothing is registered,
    /// [`ServiceError::AlreadyRunning`] if the service is registering or
    /// polling, and [`ServiceError::Handshake`] if the control plane rejects
    /// the registration. The service stays startable after a failure.
    pub async fn start(&self) -> ServiceResult<()> {
        self.context.poll.validate()?;

        let functions = self.describe();
        if functions.is_empty() {
            return Err(ServiceError::NoFunctions {
                service: self.name.clone(),
            });
        }

        {
            let mut lifecycle = lock(&self.lifecycle);
            if !lifecycle.state().can_start() {
                return Err(ServiceError::AlreadyRunning {
                    service: self.name.clone(),
                    state: lifecycle.state(),
                });
            }
            lifecycle.transition(LifecycleEvent::Register)?;
        }

        let request = RegisterMachineRequest::new(self.name.clone(), &functions);
        let handshake = match self.context.control_plane.register_machine(&request).await {
            Ok(handshake) => handshake,
            Err(source) => {
                lock(&self.lifecycle).transition(LifecycleEvent::HandshakeFailed)?;
                return Err(ServiceError::Handshake {
                    service: self.name.clone(),
                    source,
                });
            }
        };

        let initial_backoff = handshake
            .retry_after
            .unwrap_or_else(|| self.context.poll.initial_backoff());
        *lock(&self.cluster_id) = Some(handshake.cluster_id.clone());

        let poller = Poller::new(
            self.name.clone(),
            handshake.cluster_id.clone(),
            self.context.control_plane.clone(),
            Dispatcher::new(Arc::clone(&self.context.registry)),
            self.context.poll,
        );
        let (shutdown, rx) = watch::channel(false);

        // Polling must be recorded before the task can observe a failure.
        lock(&self.lifecycle).transition(LifecycleEvent::Registered)?;
        let worker = tokio::spawn(drive_poll_loop(
            poller,
            initial_backoff,
            rx,
            Arc::clone(&self.lifecycle),
        ));
        *lock(&self.running) = Some(Running { shutdown, worker });

        info!(
            service = %self.name,
            cluster_id = %handshake.cluster_id,
            functions = functions.len(),
            "service started"
        );
        Ok(())
    }

    /// Stops polling and waits for the loop to exit.
    ///
    /// A handler that is already running finishes first. Stopping a service
    /// that never started is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Lifecycle`] if the service is mid-handshake.
    pub async fn stop(&self) -> ServiceResult<()> {
        {
            let mut lifecycle = lock(&self.lifecycle);
            match lifecycle.state() {
                ServiceState::Unregistered => return Ok(()),
                ServiceState::Stopping | ServiceState::Stopped => {}
                ServiceState::Registering | ServiceState::Polling => {
                    lifecycle.transition(LifecycleEvent::Stop)?;
                }
            }
        }

        let running = lock(&self.running).take();
        if let Some(Running { shutdown, worker }) = running {
            shutdown.send_replace(true);
            match worker.await {
                Ok(exit) => info!(service = %self.name, ?exit, "service stopped"),
                Err(err) => warn!(service = %self.name, ?err, "poll task ended abnormally"),
            }
        }

        lock(&self.lifecycle).transition(LifecycleEvent::Drained)?;
        Ok(())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = running.as_ref() {
            running.shutdown.send_replace(true);
        }
    }
}

/// Every service created by one client, keyed by name.
#[derive(Debug)]
pub struct ServiceDirectory {
    context: ServiceContext,
    services: RwLock<BTreeMap<String, Arc<Service>>>,
}

impl ServiceDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new(context: ServiceContext) -> Self {
        Self {
            context,
            services: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the shared collaborators.
    #[must_use]
    pub fn context(&self) -> &ServiceContext {
        &self.context
    }

    /// Creates and stores a service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::DuplicateService`] if the name is taken, or
    /// [`ServiceError::Function`] if it is invalid.
    pub fn create(&self, name: &str) -> ServiceResult<Arc<Service>> {
        validate_service_name(name).map_err(FunctionError::from)?;

        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(name) {
            return Err(ServiceError::DuplicateService {
                service: name.to_owned(),
            });
        }

        let service = Arc::new(Service::new(name, self.context.clone())?);
        services.insert(name.to_owned(), Arc::clone(&service));
        Ok(service)
    }

    /// Returns the named service.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns every service name, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Returns every service, sorted by name.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Stops every service, logging failures.
    pub async fn stop_all(&self) {
        let services = self.all();
        let results = join_all(services.iter().map(|service| service.stop())).await;
        for (service, result) in services.iter().zip(results) {
            if let Err(err) = result {
                warn!(service = %service.name(), %err, "failed to stop service");
            }
        }
    }
}
