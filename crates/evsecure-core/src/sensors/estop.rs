//! Emergency-stop push button
//!
//! The mushroom button pulls its line low when pressed. A pin that cannot be
//! read is reported as pressed so a broken wire stops the charger.

use embedded_hal::digital::InputPin;
use log::warn;

pub struct EmergencyStopInput<P: InputPin> {
    pin: P,
    active_low: bool,
}

impl<P: InputPin> EmergencyStopInput<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: true,
        }
    }

    pub fn active_high(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
        }
    }

    pub fn is_pressed(&mut self) -> bool {
        let level = if self.active_low {
            self.pin.is_low()
        } else {
            self.pin.is_high()
        };
        match level {
            Ok(pressed) => pressed,
            Err(_) => {
                warn!("Emergency stop input unreadable, treating as pressed");
                true
            }
        }
    }

    pub fn release(self) -> P {
        self.pin
    }
}
