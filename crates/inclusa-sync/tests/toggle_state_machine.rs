//! Stateful property testing for optimistic toggles.
//!
//! Drives a [`Toggle`] through random interleavings of actions starting,
//! settling in any order, failing, and background refetches, and checks it
//! against a reference model of what the user should see:
//!
//! - while anything is outstanding, the newest action's prediction shows
//! - once idle, the cached value shows
//! - only the newest successful action is written back to the cache

use std::collections::HashMap;

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};

use inclusa_sync::{LikeState, Toggle};

/// Operations that can be performed on a toggle.
#[derive(Debug, Clone)]
pub enum ToggleOperation {
    /// The user taps the like button.
    Begin,
    /// The backend confirms one of the outstanding actions.
    Succeed { pick: usize },
    /// The backend rejects one of the outstanding actions.
    Fail { pick: usize },
    /// A refetch replaces the cached value.
    Refetch { state: LikeState },
}

#[derive(Clone, Debug)]
pub struct ModelAction {
    version: u64,
    predicted: LikeState,
    outstanding: bool,
}

/// Reference model for one toggled entity.
#[derive(Clone, Debug)]
pub struct ToggleModel {
    cached: LikeState,
    actions: Vec<ModelAction>,
    newest_success: u64,
}

impl ToggleModel {
    fn outstanding(&self) -> Vec<&ModelAction> {
        self.actions.iter().filter(|a| a.outstanding).collect()
    }

    fn display(&self) -> LikeState {
        self.outstanding()
            .last()
            .map(|a| a.predicted)
            .unwrap_or(self.cached)
    }

    fn pick(&self, pick: usize) -> Option<u64> {
        let outstanding = self.outstanding();
        if outstanding.is_empty() {
            return None;
        }
        Some(outstanding[pick % outstanding.len()].version)
    }
}

fn like_state() -> impl Strategy<Value = LikeState> {
    (any::<bool>(), 0u64..20).prop_map(|(liked, count)| LikeState::new(liked, count))
}

impl ReferenceStateMachine for ToggleModel {
    type State = Self;
    type Transition = ToggleOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        like_state()
            .prop_map(|cached| Self {
                cached,
                actions: Vec::new(),
                newest_success: 0,
            })
            .boxed()
    }

    fn transitions(state: &Self::State) -> BoxedStrategy<Self::Transition> {
        if state.outstanding().is_empty() {
            prop_oneof![
                4 => Just(ToggleOperation::Begin),
                1 => like_state().prop_map(|state| ToggleOperation::Refetch { state }),
            ]
            .boxed()
        } else {
            prop_oneof![
                3 => Just(ToggleOperation::Begin),
                3 => (0usize..8).prop_map(|pick| ToggleOperation::Succeed { pick }),
                2 => (0usize..8).prop_map(|pick| ToggleOperation::Fail { pick }),
                1 => like_state().prop_map(|state| ToggleOperation::Refetch { state }),
            ]
            .boxed()
        }
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            ToggleOperation::Begin => {
                let predicted = state.display().toggled();
                let version = state.actions.len() as u64 + 1;
                state.actions.push(ModelAction {
                    version,
                    predicted,
                    outstanding: true,
                });
            }
            ToggleOperation::Succeed { pick } => {
                if let Some(version) = state.pick(*pick) {
                    let action = &mut state.actions[version as usize - 1];
                    action.outstanding = false;
                    if version > state.newest_success {
                        state.cached = action.predicted;
                        state.newest_success = version;
                    }
                }
            }
            ToggleOperation::Fail { pick } => {
                if let Some(version) = state.pick(*pick) {
                    state.actions[version as usize - 1].outstanding = false;
                }
            }
            ToggleOperation::Refetch { state: fresh } => {
                state.cached = *fresh;
            }
        }
        state
    }

    fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
        match transition {
            ToggleOperation::Succeed { .. } | ToggleOperation::Fail { .. } => {
                !state.outstanding().is_empty()
            }
            _ => true,
        }
    }
}

/// The real toggle plus the cached value it overlays.
pub struct ToggleHarness {
    toggle: Toggle<LikeState>,
    cached: LikeState,
    outstanding: Vec<u64>,
    predictions: HashMap<u64, LikeState>,
}

impl ToggleHarness {
    fn pick(&self, pick: usize) -> Option<u64> {
        if self.outstanding.is_empty() {
            return None;
        }
        Some(self.outstanding[pick % self.outstanding.len()])
    }

    fn settle(&mut self, version: u64) {
        self.outstanding.retain(|v| *v != version);
    }

    fn verify_invariants(&self, model: &ToggleModel) {
        assert_eq!(self.cached, model.cached, "cached value diverged");
        assert_eq!(
            self.toggle.display(&self.cached),
            model.display(),
            "displayed value diverged"
        );
        assert_eq!(self.toggle.outstanding(), model.outstanding().len());
        if self.toggle.is_idle() {
            assert_eq!(self.toggle.display(&self.cached), self.cached);
        }
    }
}

impl StateMachineTest for ToggleHarness {
    type SystemUnderTest = Self;
    type Reference = ToggleModel;

    fn init_test(
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Self {
            toggle: Toggle::new(),
            cached: ref_state.cached,
            outstanding: Vec::new(),
            predictions: HashMap::new(),
        }
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        match transition {
            ToggleOperation::Begin => {
                let (version, predicted) = state.toggle.begin(&state.cached, LikeState::toggled);
                state.outstanding.push(version);
                state.predictions.insert(version, predicted);
            }
            ToggleOperation::Succeed { pick } => {
                if let Some(version) = state.pick(pick) {
                    if state.toggle.accepts(version) {
                        state.cached = state.predictions[&version];
                    }
                    state.toggle.succeed(version);
                    state.settle(version);
                }
            }
            ToggleOperation::Fail { pick } => {
                if let Some(version) = state.pick(pick) {
                    assert!(state.toggle.fail(version));
                    state.settle(version);
                }
            }
            ToggleOperation::Refetch { state: fresh } => {
                state.cached = fresh;
            }
        }
        state.verify_invariants(ref_state);
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        state.verify_invariants(ref_state);
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 10000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn toggle_state_machine_test(sequential 1..40 => ToggleHarness);
}

// Targeted properties

proptest! {
    #[test]
    fn prop_single_failure_restores_exact_value(initial in like_state()) {
        let mut toggle = Toggle::new();
        let (version, _) = toggle.begin(&initial, LikeState::toggled);
        toggle.fail(version);
        prop_assert_eq!(toggle.display(&initial), initial);
    }

    #[test]
    fn prop_all_successes_converge_to_last_prediction(initial in like_state(), taps in 1usize..6, order in any::<u64>()) {
        let mut toggle = Toggle::new();
        let mut cached = initial;
        let mut begun = Vec::new();
        for _ in 0..taps {
            begun.push(toggle.begin(&cached, LikeState::toggled));
        }
        let last = begun.last().map(|(_, p)| *p).unwrap();

        // Settle in a pseudo-random order
        let mut seed = order;
        while !begun.is_empty() {
            let (version, predicted) = begun.remove((seed as usize) % begun.len());
            seed = seed.rotate_left(7) ^ 0x9e37_79b9;
            if toggle.accepts(version) {
                cached = predicted;
            }
            toggle.succeed(version);
        }

        prop_assert!(toggle.is_idle());
        prop_assert_eq!(cached, last);
        prop_assert_eq!(toggle.display(&cached), last);
    }
}
