use crate::{
    error::InvariantViolation,
    state::roster::{ParticipantId, Roster},
};

/// Tracks the single living participant allowed to shoot during the open day.
///
/// Only mutated from inside the engine's state lock, so assignments never race.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GunLedger {
    holder: Option<ParticipantId>,
}

impl GunLedger {
    /// An empty ledger; nobody holds the gun yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the gun to `id`, which must be a living member of `roster`.
    pub fn assign(&mut self, roster: &Roster, id: ParticipantId) -> Result<(), InvariantViolation> {
        match roster.get(id) {
            None => Err(InvariantViolation::UnknownParticipant(id)),
            Some(participant) if !participant.is_alive() => {
                Err(InvariantViolation::DeadParticipant(id))
            }
            Some(_) => {
                self.holder = Some(id);
                Ok(())
            }
        }
    }

    /// Current gun-bearer, if any.
    pub fn holder(&self) -> Option<ParticipantId> {
        self.holder
    }

    /// Whether `id` currently holds the gun.
    pub fn is_held_by(&self, id: ParticipantId) -> bool {
        self.holder == Some(id)
    }

    /// Drop the gun, e.g. because its bearer died. Returns the previous holder.
    pub fn clear(&mut self) -> Option<ParticipantId> {
        self.holder.take()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::config::TeamSizeTable;

    fn roster() -> Roster {
        let ids = (1..=6).map(ParticipantId).collect::<Vec<_>>();
        let mut rng = StdRng::seed_from_u64(11);
        Roster::build(&ids, &TeamSizeTable::default(), &mut rng).unwrap()
    }

    #[test]
    fn assign_and_clear() {
        let roster = roster();
        let mut gun = GunLedger::new();
        assert_eq!(gun.holder(), None);

        gun.assign(&roster, ParticipantId(2)).unwrap();
        assert!(gun.is_held_by(ParticipantId(2)));
        assert_eq!(gun.clear(), Some(ParticipantId(2)));
        assert_eq!(gun.holder(), None);
    }

    #[test]
    fn dead_or_unknown_holder_is_refused() {
        let mut roster = roster();
        let mut gun = GunLedger::new();
        gun.assign(&roster, ParticipantId(1)).unwrap();
        roster.kill(ParticipantId(3)).unwrap();

        assert_eq!(
            gun.assign(&roster, ParticipantId(3)),
            Err(InvariantViolation::DeadParticipant(ParticipantId(3)))
        );
        assert_eq!(
            gun.assign(&roster, ParticipantId(42)),
            Err(InvariantViolation::UnknownParticipant(ParticipantId(42)))
        );
        assert!(gun.is_held_by(ParticipantId(1)));
    }
}
