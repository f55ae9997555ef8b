// Licensed under the Apache-2.0 license

//! The Activation state machine from spec.md 4.2, implemented with
//! `smlang::statemachine!` in the same `Context<T: StateMachineActions>`
//! shape as the teacher's `pldm-ua::update_sm`/`discovery_sm`: a generated
//! `StateMachine<Context<T>>` delegates every action/guard to a
//! user-supplied `T`, so domain-specific bookkeeping (the BMC redundancy
//! arbiter's priority/U-Boot steps) can hook in without touching the
//! transition table itself.

use log::debug;
use smlang::statemachine;

statemachine! {
    derive_states: [Debug, Clone, Copy, PartialEq, Eq],
    derive_events: [Debug, Clone],
    transitions: {
        *NotReady + VerifyReady / on_verify_ready = Ready,
        NotReady + VerifyInvalid / on_verify_invalid = Failed,

        Ready + RequestActive / on_enter_activating = Activating,

        Activating + ReportProgress(u8) [progress_is_monotonic] / on_progress = Activating,
        Activating + DriverSucceeded / on_driver_succeeded = Active,
        Activating + DriverFailed / on_driver_failed = Failed,

        // spec.md 4.2: "Failed -- requested=Active --> Activating (retry)"
        Failed + RequestActive / on_enter_activating = Activating,
    }
}

/// Per spec.md 8 invariant: `ActivationBlocksTransition` and
/// `ActivationProgress` exist if and only if the state is `Activating`.
/// `associations` models spec.md 4.7's `Associations` interface as a flat
/// list of (forward, reverse, endpoint) triples, the OpenBMC idiom.
pub struct InnerContext {
    pub swid: String,
    pub progress: u8,
    pub blocks_transition: bool,
    pub associations: Vec<(String, String, String)>,
}

impl InnerContext {
    pub fn new(swid: impl Into<String>) -> Self {
        Self {
            swid: swid.into(),
            progress: 0,
            blocks_transition: false,
            associations: Vec::new(),
        }
    }
}

pub trait StateMachineActions {
    fn progress_is_monotonic(&self, ctx: &InnerContext, value: &u8) -> Result<bool, ()> {
        Ok(*value >= ctx.progress && *value <= 100)
    }

    fn on_verify_ready(&mut self, _ctx: &mut InnerContext) -> Result<(), ()> {
        Ok(())
    }

    fn on_verify_invalid(&mut self, _ctx: &mut InnerContext) -> Result<(), ()> {
        Ok(())
    }

    fn on_enter_activating(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        ctx.blocks_transition = true;
        ctx.progress = 0;
        Ok(())
    }

    fn on_progress(&mut self, ctx: &mut InnerContext, value: u8) -> Result<(), ()> {
        ctx.progress = value;
        Ok(())
    }

    fn on_driver_succeeded(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        ctx.blocks_transition = false;
        ctx.progress = 100;
        Ok(())
    }

    fn on_driver_failed(&mut self, ctx: &mut InnerContext) -> Result<(), ()> {
        ctx.blocks_transition = false;
        Ok(())
    }
}

pub struct DefaultActions;
impl StateMachineActions for DefaultActions {}

pub struct Context<T: StateMachineActions> {
    inner: T,
    pub inner_ctx: InnerContext,
}

impl<T: StateMachineActions> Context<T> {
    pub fn new(context: T, swid: impl Into<String>) -> Self {
        Self {
            inner: context,
            inner_ctx: InnerContext::new(swid),
        }
    }
}

macro_rules! delegate_action {
    ($($fn_name:ident ($($arg:ident : $arg_ty:ty),*) -> $ret:ty),* $(,)?) => {
        $(
            fn $fn_name(&mut self, $($arg: $arg_ty),*) -> $ret {
                debug!("Activation action: {}", stringify!($fn_name));
                self.inner.$fn_name(&mut self.inner_ctx, $($arg),*)
            }
        )*
    };
}

macro_rules! delegate_guard {
    ($($fn_name:ident ($($arg:ident : $arg_ty:ty),*) -> $ret:ty),* $(,)?) => {
        $(
            fn $fn_name(&self, $($arg: $arg_ty),*) -> $ret {
                self.inner.$fn_name(&self.inner_ctx, $($arg),*)
            }
        )*
    };
}

impl<T: StateMachineActions> StateMachineContext for Context<T> {
    delegate_action! {
        on_verify_ready() -> Result<(), ()>,
        on_verify_invalid() -> Result<(), ()>,
        on_enter_activating() -> Result<(), ()>,
        on_progress(value: u8) -> Result<(), ()>,
        on_driver_succeeded() -> Result<(), ()>,
        on_driver_failed() -> Result<(), ()>,
    }

    delegate_guard! {
        progress_is_monotonic(value: &u8) -> Result<bool, ()>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_machine() -> StateMachine<Context<DefaultActions>> {
        StateMachine::new(Context::new(DefaultActions, "bmc_1"))
    }

    #[test]
    fn happy_path_reaches_active() {
        let mut sm = new_machine();
        sm.process_event(Events::VerifyReady).unwrap();
        assert!(matches!(*sm.state(), States::Ready));
        sm.process_event(Events::RequestActive).unwrap();
        assert!(matches!(*sm.state(), States::Activating));
        assert!(sm.context().inner_ctx.blocks_transition);
        sm.process_event(Events::ReportProgress(50)).unwrap();
        assert_eq!(sm.context().inner_ctx.progress, 50);
        sm.process_event(Events::DriverSucceeded).unwrap();
        assert!(matches!(*sm.state(), States::Active));
        assert!(!sm.context().inner_ctx.blocks_transition);
    }

    #[test]
    fn non_monotonic_progress_is_rejected() {
        let mut sm = new_machine();
        sm.process_event(Events::VerifyReady).unwrap();
        sm.process_event(Events::RequestActive).unwrap();
        sm.process_event(Events::ReportProgress(50)).unwrap();
        assert!(sm.process_event(Events::ReportProgress(20)).is_err());
        assert_eq!(sm.context().inner_ctx.progress, 50);
    }

    #[test]
    fn failed_update_can_be_retried() {
        let mut sm = new_machine();
        sm.process_event(Events::VerifyReady).unwrap();
        sm.process_event(Events::RequestActive).unwrap();
        sm.process_event(Events::DriverFailed).unwrap();
        assert!(matches!(*sm.state(), States::Failed));
        sm.process_event(Events::RequestActive).unwrap();
        assert!(matches!(*sm.state(), States::Activating));
    }

    #[test]
    fn invalid_manifest_goes_straight_to_failed() {
        let mut sm = new_machine();
        sm.process_event(Events::VerifyInvalid).unwrap();
        assert!(matches!(*sm.state(), States::Failed));
    }
}
