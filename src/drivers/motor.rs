//! Lid motor driver (two-input H-bridge).
//!
//! One output drives the lid closed, the other drives it open. Both low
//! is stop. The driver de-asserts the opposite output before asserting
//! the requested one, so the bridge never sees both inputs high.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::ActuatorPort;
use crate::error::ActuatorError;
use crate::fsm::ActuatorCommand;

pub struct LidMotor<O: OutputPin, C: OutputPin> {
    open: O,
    close: C,
    current: ActuatorCommand,
}

impl<O: OutputPin, C: OutputPin> LidMotor<O, C> {
    /// Take both pins and drive them low.
    pub fn new(open: O, close: C) -> Result<Self, ActuatorError> {
        let mut motor = Self {
            open,
            close,
            current: ActuatorCommand::Stop,
        };
        motor.release_both()?;
        Ok(motor)
    }

    fn release_both(&mut self) -> Result<(), ActuatorError> {
        // Release both before reporting, even if the first write failed.
        let open = self.open.set_low();
        let close = self.close.set_low();
        open.map_err(|_| ())
            .and(close.map_err(|_| ()))
            .map_err(|_| ActuatorError::GpioWriteFailed)
    }

    fn drive(&mut self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        match command {
            ActuatorCommand::Stop => self.release_both(),
            ActuatorCommand::Close => {
                self.open.set_low().map_err(|_| ActuatorError::GpioWriteFailed)?;
                self.close.set_high().map_err(|_| ActuatorError::GpioWriteFailed)
            }
            ActuatorCommand::Open => {
                self.close.set_low().map_err(|_| ActuatorError::GpioWriteFailed)?;
                self.open.set_high().map_err(|_| ActuatorError::GpioWriteFailed)
            }
        }
    }

    #[cfg(test)]
    fn pins(&self) -> (&O, &C) {
        (&self.open, &self.close)
    }
}

impl<O: OutputPin, C: OutputPin> ActuatorPort for LidMotor<O, C> {
    fn apply(&mut self, command: ActuatorCommand) -> Result<(), ActuatorError> {
        match self.drive(command) {
            Ok(()) => {
                self.current = command;
                Ok(())
            }
            Err(e) => {
                warn!("lid motor: {:?} failed, releasing outputs", command);
                if let Err(release) = self.release_both() {
                    warn!("lid motor: release after failed {:?} also failed: {}", command, release);
                }
                self.current = ActuatorCommand::Stop;
                Err(e)
            }
        }
    }

    fn current(&self) -> ActuatorCommand {
        self.current
    }
}
