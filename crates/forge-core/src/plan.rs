//! TaskPlan / PlanStep (§3), used by step-by-step execution mode.
//!
//! Grounded on `work_packet/types.rs`'s ordered-delegation-step idiom.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub order: u32,
    pub description: String,
    pub target_file: Option<String>,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub required_components: Vec<String>,
    pub dependency_order: Vec<String>,
    pub steps: Vec<PlanStep>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("step {attempted} cannot complete before step {expected} (out-of-order completion)")]
    OutOfOrderCompletion { expected: u32, attempted: u32 },
    #[error("no step with order {0}")]
    StepNotFound(u32),
}

impl TaskPlan {
    /// The first step not yet `Completed`, in order. `None` once every step is done.
    pub fn next_pending_step(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| !matches!(s.status, StepStatus::Completed))
    }

    /// Marks `order` completed. Steps must advance strictly in order (§3): completing a step
    /// before all lower-order steps are `Completed` is rejected.
    pub fn complete_step(&mut self, order: u32) -> Result<(), PlanError> {
        let expected = self
            .steps
            .iter()
            .find(|s| !matches!(s.status, StepStatus::Completed))
            .map(|s| s.order);
        match expected {
            Some(expected_order) if expected_order != order => {
                Err(PlanError::OutOfOrderCompletion { expected: expected_order, attempted: order })
            }
            Some(_) => {
                let step = self
                    .steps
                    .iter_mut()
                    .find(|s| s.order == order)
                    .ok_or(PlanError::StepNotFound(order))?;
                step.status = StepStatus::Completed;
                Ok(())
            }
            None => Err(PlanError::StepNotFound(order)),
        }
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| matches!(s.status, StepStatus::Completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with_two_steps() -> TaskPlan {
        TaskPlan {
            required_components: vec![],
            dependency_order: vec![],
            steps: vec![
                PlanStep { order: 1, description: "step 1".into(), target_file: None, status: StepStatus::Pending },
                PlanStep { order: 2, description: "step 2".into(), target_file: None, status: StepStatus::Pending },
            ],
        }
    }

    #[test]
    fn steps_advance_strictly_in_order() {
        let mut plan = plan_with_two_steps();
        plan.complete_step(1).unwrap();
        assert_eq!(plan.next_pending_step().unwrap().order, 2);
        plan.complete_step(2).unwrap();
        assert!(plan.all_completed());
    }

    #[test]
    fn out_of_order_completion_is_rejected() {
        let mut plan = plan_with_two_steps();
        let err = plan.complete_step(2).unwrap_err();
        assert!(matches!(err, PlanError::OutOfOrderCompletion { expected: 1, attempted: 2 }));
    }

    #[test]
    fn completing_unknown_step_order_is_an_error() {
        let mut plan = plan_with_two_steps();
        plan.complete_step(1).unwrap();
        let err = plan.complete_step(99).unwrap_err();
        assert!(matches!(err, PlanError::OutOfOrderCompletion { expected: 2, attempted: 99 }));
    }

    #[test]
    fn completing_past_the_last_step_is_rejected() {
        let mut plan = plan_with_two_steps();
        plan.complete_step(1).unwrap();
        plan.complete_step(2).unwrap();
        let err = plan.complete_step(3).unwrap_err();
        assert!(matches!(err, PlanError::StepNotFound(3)));
    }
}
