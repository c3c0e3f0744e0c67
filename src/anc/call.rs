//! Voice-call override
//!
//! A call start forces ANC on in the configured call mode; the call end
//! restores what the user had, unless the user changed it mid-call.

use crate::event::Event;
use crate::Result;

use super::AncManager;

impl AncManager {
    pub(super) fn on_implicit_enable(&mut self) -> Result<()> {
        if !self.config.call.implicit_enable {
            return Ok(());
        }

        self.state.reset_user_flags();
        self.state.implicit_enable_active = false;
        self.state.mode_override_active = false;

        let call_mode = self.config.call.mode;
        if self.is_enabled() {
            if self.state.current_mode != call_mode {
                self.state.previous_mode = self.state.current_mode;
                self.state.mode_override_active = true;
                tracing::info!(from = %self.state.previous_mode, to = %call_mode, "call mode override");
                self.internal_set_mode(call_mode)?;
            }
        } else {
            tracing::info!(mode = %call_mode, "ANC enabled for call");
            self.internal_set_mode(call_mode)?;
            self.state.implicit_enable_active = true;
            self.handle_in_state(Event::Enable)?;
        }
        Ok(())
    }

    pub(super) fn on_implicit_disable(&mut self) -> Result<()> {
        if !self.config.call.implicit_enable {
            return Ok(());
        }

        let mut result = Ok(());
        if self.state.implicit_enable_active {
            if !self.state.user_initiated_enable && self.is_enabled() {
                tracing::info!("call ended, disabling ANC");
                result = self.handle_in_state(Event::Disable);
            }
        } else if self.state.mode_override_active && !self.state.user_initiated_mode_switch {
            let mode = self.state.previous_mode;
            tracing::info!(%mode, "call ended, restoring mode");
            result = self.internal_set_mode(mode);
        }

        self.state.reset_user_flags();
        self.state.implicit_enable_active = false;
        self.state.mode_override_active = false;
        result
    }
}
