use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::flight_plan::MavlinkFlightPlan;

struct ProgressSubscription {
    generation: u64,
    cancel: CancellationToken,
}

/// The uploaded mission and the one live generation of progress subscriptions.
///
/// Replacing or clearing the mission cancels the previous generation before anything new is
/// installed, so handlers of a stale generation can recognize themselves and bail out.
pub(super) struct ActivePlanSlot {
    mission: Option<Arc<MavlinkFlightPlan>>,
    progress: Option<ProgressSubscription>,
    generation: u64,
}

impl ActivePlanSlot {
    pub(super) fn new() -> Self {
        Self {
            mission: None,
            progress: None,
            generation: 0,
        }
    }

    /// Returns whether there was anything to clear.
    pub(super) fn clear(&mut self) -> bool {
        let had_progress = match self.progress.take() {
            Some(progress) => {
                progress.cancel.cancel();
                true
            }
            None => false,
        };
        self.mission.take().is_some() || had_progress
    }

    /// Installs `mission` and returns the generation and token its subscriptions must run under.
    pub(super) fn install(
        &mut self,
        mission: Arc<MavlinkFlightPlan>,
        scope: &CancellationToken,
    ) -> (u64, CancellationToken) {
        self.clear();
        self.generation += 1;
        let cancel = scope.child_token();
        self.progress = Some(ProgressSubscription {
            generation: self.generation,
            cancel: cancel.clone(),
        });
        self.mission = Some(mission);
        (self.generation, cancel)
    }

    pub(super) fn mission(&self) -> Option<&Arc<MavlinkFlightPlan>> {
        self.mission.as_ref()
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.progress
            .as_ref()
            .is_some_and(|p| p.generation == generation && !p.cancel.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight_plan::{FlatElevationModel, FlightPlan};
    use crate::model::Position;

    fn empty_mission() -> Arc<MavlinkFlightPlan> {
        Arc::new(MavlinkFlightPlan::from_flight_plan(
            Arc::new(FlightPlan::new("empty", Vec::new())),
            0,
            &Default::default(),
            Position::new(0.0, 0.0, 10.0),
            &FlatElevationModel::default(),
        ))
    }

    #[test]
    fn replacing_cancels_previous_generation() {
        let scope = CancellationToken::new();
        let mut slot = ActivePlanSlot::new();

        let (first, first_token) = slot.install(empty_mission(), &scope);
        assert!(slot.is_current(first));

        let (second, second_token) = slot.install(empty_mission(), &scope);
        assert!(first_token.is_cancelled());
        assert!(!second_token.is_cancelled());
        assert!(!slot.is_current(first));
        assert!(slot.is_current(second));
        assert!(slot.mission().is_some());
    }

    #[test]
    fn clearing_cancels_and_reports() {
        let scope = CancellationToken::new();
        let mut slot = ActivePlanSlot::new();
        assert!(!slot.clear());

        let (generation, token) = slot.install(empty_mission(), &scope);
        assert!(slot.clear());
        assert!(token.is_cancelled());
        assert!(!slot.is_current(generation));
        assert!(slot.mission().is_none());
        assert!(!slot.clear());
    }

    #[test]
    fn scope_cancellation_reaches_subscriptions() {
        let scope = CancellationToken::new();
        let mut slot = ActivePlanSlot::new();
        let (generation, token) = slot.install(empty_mission(), &scope);

        scope.cancel();
        assert!(token.is_cancelled());
        assert!(!slot.is_current(generation));
    }
}
