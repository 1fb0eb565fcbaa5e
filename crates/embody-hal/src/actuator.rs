//! Generic `Actuator` trait for the agent's body in the virtual world.
//!
//! World clients implement this trait and hand it to the
//! `NavigationController`, which becomes its only writer.  The rest of the
//! system never touches movement signals directly.

use embody_types::{EmbodyError, MovementSignal, Quaternion, Vec3};

/// The agent's physical presence: where it is, which way it faces, and which
/// movement keys it is holding.
pub trait Actuator: Send + Sync {
    /// Stable identifier for this body, e.g. `"avatar"`.
    fn id(&self) -> &str;

    /// Hold (`asserted = true`) or release a movement signal.
    ///
    /// # Errors
    ///
    /// Returns [`EmbodyError::InvalidState`] if the world client rejects the
    /// input (e.g. the avatar is not spawned).
    fn set_movement_signal(
        &mut self,
        signal: MovementSignal,
        asserted: bool,
    ) -> Result<(), EmbodyError>;

    /// Most recently reported world position.
    fn position(&self) -> Vec3;

    /// Most recently reported orientation.
    fn orientation(&self) -> Quaternion;

    /// Overwrite the orientation, used to repair a drifted quaternion.
    fn set_orientation(&mut self, orientation: Quaternion);

    /// Turn the body so its forward axis points along the planar `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`EmbodyError::InvalidState`] when the direction is unusable.
    fn set_facing(&mut self, direction: Vec3) -> Result<(), EmbodyError>;

    /// Release every movement signal.
    ///
    /// Every signal is attempted even if an earlier one fails; the first
    /// error is returned.
    fn release_all(&mut self) -> Result<(), EmbodyError> {
        let mut first_err = None;
        for signal in MovementSignal::ALL {
            if let Err(e) = self.set_movement_signal(signal, false) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
