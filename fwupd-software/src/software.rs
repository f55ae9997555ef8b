// Licensed under the Apache-2.0 license

//! The Software object lifecycle from spec.md 4.7: Activation, Version,
//! Update, ActivationProgress, ActivationBlocksTransition, Associations.

use fwupd_core::ids::software_object_path;

use crate::activation::{Context, DefaultActions, Events, StateMachine, States};

/// spec.md 9's open question on `Version.setVersion`: this implementation
/// makes it set-once (first call wins), documented in DESIGN.md.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version(Option<String>);

impl Version {
    pub fn set(&mut self, value: impl Into<String>) {
        if self.0.is_some() {
            log::debug!("version already set; ignoring overwrite");
            return;
        }
        self.0 = Some(value.into());
    }

    pub fn get(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// A firmware image instance, either running on or pending for a device.
/// spec.md 3: "has a unique swid; publishes objectPath = /software/<swid>;
/// activationState monotone except on explicit Failed -> Ready retry."
pub struct Software {
    swid: String,
    version: Version,
    updatable: bool,
    sm: StateMachine<Context<DefaultActions>>,
}

impl Software {
    pub fn new(swid: impl Into<String>, updatable: bool) -> Self {
        let swid = swid.into();
        Self {
            sm: StateMachine::new(Context::new(DefaultActions, swid.clone())),
            swid,
            version: Version::default(),
            updatable,
        }
    }

    pub fn swid(&self) -> &str {
        &self.swid
    }

    pub fn object_path(&self) -> String {
        software_object_path(&self.swid)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn set_version(&mut self, value: impl Into<String>) {
        self.version.set(value);
    }

    pub fn updatable(&self) -> bool {
        self.updatable
    }

    pub fn state(&self) -> States {
        *self.sm.state()
    }

    pub fn progress(&self) -> u8 {
        self.sm.context().inner_ctx.progress
    }

    pub fn blocks_transition(&self) -> bool {
        self.sm.context().inner_ctx.blocks_transition
    }

    pub fn associations(&self) -> &[(String, String, String)] {
        &self.sm.context().inner_ctx.associations
    }

    pub fn add_association(&mut self, forward: &str, reverse: &str, endpoint: &str) {
        self.sm
            .context_mut()
            .inner_ctx
            .associations
            .push((forward.to_string(), reverse.to_string(), endpoint.to_string()));
    }

    pub fn verify_ready(&mut self) -> Result<(), ()> {
        self.sm.process_event(Events::VerifyReady)
    }

    pub fn verify_invalid(&mut self) -> Result<(), ()> {
        self.sm.process_event(Events::VerifyInvalid)
    }

    /// The setter peers can write through the IPC `Activation.requestedState`
    /// property (spec.md 6): "only `requestedState` is writable by peers
    /// (value Active only)." Any other requested value is rejected without
    /// touching the state machine.
    pub fn request_active(&mut self) -> Result<(), ()> {
        if !matches!(self.state(), States::Ready | States::Failed) {
            return Err(());
        }
        self.sm.process_event(Events::RequestActive)
    }

    pub fn report_progress(&mut self, value: u8) -> Result<(), ()> {
        self.sm.process_event(Events::ReportProgress(value))
    }

    pub fn driver_succeeded(&mut self) -> Result<(), ()> {
        self.sm.process_event(Events::DriverSucceeded)
    }

    pub fn driver_failed(&mut self) -> Result<(), ()> {
        self.sm.process_event(Events::DriverFailed)
    }
}
