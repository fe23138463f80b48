// Queue Instance Domain Model (persisted record + transitions)

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::context::TaskContext;

/// Queue instance ID (UUID v4)
pub type InstanceId = String;

/// Queue definition identifier
pub type DefinitionId = String;

/// Task identifier
pub type TaskId = String;

/// Execution direction of a queue instance.
///
/// Persisted as a boolean flag (`false` = forward, `true` = backward) so the
/// snapshot format stays a flat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    pub fn is_backward(self) -> bool {
        matches!(self, Direction::Backward)
    }

    /// Cursor delta applied on advance
    pub fn delta(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    /// Marker used when rendering queue progress
    pub fn marker(self) -> char {
        match self {
            Direction::Forward => '>',
            Direction::Backward => '<',
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "FORWARD"),
            Direction::Backward => write!(f, "BACKWARD"),
        }
    }
}

impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_backward())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let backward = bool::deserialize(deserializer)?;
        Ok(if backward {
            Direction::Backward
        } else {
            Direction::Forward
        })
    }
}

/// One running execution of a queue definition.
///
/// Everything needed to resume after a restart lives in the serialized
/// fields; `finished` is runtime-only and never written to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInstance {
    pub instance_id: InstanceId,
    pub definition_id: DefinitionId,

    #[serde(default)]
    pub context: TaskContext,

    #[serde(default)]
    pub cursor: i64,

    #[serde(default)]
    pub step_done: bool,

    #[serde(default)]
    pub direction: Direction,

    #[serde(skip)]
    finished: bool,
}

impl QueueInstance {
    /// Create a fresh instance positioned before the first task
    ///
    /// # Arguments
    ///
    /// * `instance_id` - Unique instance ID (injected, not generated)
    /// * `definition_id` - Queue definition this instance executes
    /// * `context` - Initial context handed to the first task
    pub fn new(
        instance_id: impl Into<String>,
        definition_id: impl Into<String>,
        context: TaskContext,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            definition_id: definition_id.into(),
            context,
            cursor: 0,
            step_done: false,
            direction: Direction::Forward,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the cursor has crossed the bound for the current direction
    pub fn is_drained(&self, len: usize) -> bool {
        match self.direction {
            Direction::Forward => self.cursor >= len as i64,
            Direction::Backward => self.cursor < 0,
        }
    }

    /// Mark the instance finished if it is drained; returns the new flag
    pub fn settle(&mut self, len: usize) -> bool {
        if self.is_drained(len) {
            self.finished = true;
        }
        self.finished
    }

    /// Whether the cursor sits inside the valid range for its direction.
    ///
    /// Forward allows `0..=len`, backward allows `-1..=len-1`.
    pub fn is_within_bounds(&self, len: usize) -> bool {
        let len = len as i64;
        match self.direction {
            Direction::Forward => (0..=len).contains(&self.cursor),
            Direction::Backward => (-1..len).contains(&self.cursor),
        }
    }

    /// Flip Forward -> Backward (compensation).
    ///
    /// Keeps the cursor so compensation starts with the task that was last
    /// attempted. Returns false when the instance was already backward.
    pub fn reverse(&mut self) -> bool {
        if self.direction.is_backward() {
            return false;
        }
        self.direction = Direction::Backward;
        self.step_done = false;
        true
    }

    /// Record that the active task's action was issued and awaits confirmation
    pub fn mark_step_done(&mut self) {
        self.step_done = true;
    }

    /// Move the cursor one step in the current direction
    pub fn advance(&mut self, len: usize) {
        self.cursor += self.direction.delta();
        self.step_done = false;
        self.settle(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance() -> QueueInstance {
        QueueInstance::new("inst-1", "QA", TaskContext::new())
    }

    #[test]
    fn test_new_instance_defaults() {
        let inst = instance();
        assert_eq!(inst.cursor, 0);
        assert!(!inst.step_done);
        assert_eq!(inst.direction, Direction::Forward);
        assert!(!inst.is_finished());
    }

    #[test]
    fn test_advance_resets_step_done() {
        let mut inst = instance();
        inst.mark_step_done();
        inst.advance(3);
        assert_eq!(inst.cursor, 1);
        assert!(!inst.step_done);
        assert!(!inst.is_finished());
    }

    #[test]
    fn test_forward_drains_at_len() {
        let mut inst = instance();
        inst.advance(2);
        inst.advance(2);
        assert_eq!(inst.cursor, 2);
        assert!(inst.is_finished());
    }

    #[test]
    fn test_reverse_keeps_cursor_and_only_once() {
        let mut inst = instance();
        inst.cursor = 2;
        inst.step_done = true;

        assert!(inst.reverse());
        assert_eq!(inst.direction, Direction::Backward);
        assert_eq!(inst.cursor, 2);
        assert!(!inst.step_done);

        assert!(!inst.reverse(), "Backward must never flip again");
        assert_eq!(inst.direction, Direction::Backward);
    }

    #[test]
    fn test_backward_drains_below_zero() {
        let mut inst = instance();
        inst.reverse();
        inst.advance(3);
        assert_eq!(inst.cursor, -1);
        assert!(inst.is_finished());
    }

    #[test]
    fn test_bounds_per_direction() {
        let mut inst = instance();
        inst.cursor = 3;
        assert!(inst.is_within_bounds(3));
        inst.cursor = 4;
        assert!(!inst.is_within_bounds(3));

        inst.reverse();
        inst.cursor = 3;
        assert!(!inst.is_within_bounds(3));
        inst.cursor = -1;
        assert!(inst.is_within_bounds(3));
    }

    #[test]
    fn test_serialized_field_names() {
        let mut inst = QueueInstance::new(
            "inst-2",
            "QB",
            TaskContext::from_value(json!({"name": "banana"})).unwrap(),
        );
        inst.cursor = 1;
        inst.reverse();

        let value = serde_json::to_value(&inst).unwrap();
        assert_eq!(
            value,
            json!({
                "instanceId": "inst-2",
                "definitionId": "QB",
                "context": {"name": "banana"},
                "cursor": 1,
                "stepDone": false,
                "direction": true
            })
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let inst: QueueInstance =
            serde_json::from_value(json!({"instanceId": "x", "definitionId": "QC"})).unwrap();
        assert_eq!(inst.cursor, 0);
        assert!(!inst.step_done);
        assert_eq!(inst.direction, Direction::Forward);
        assert!(inst.context.is_empty());
    }

    #[test]
    fn test_round_trip_drops_runtime_flag() {
        let mut inst = instance();
        inst.context.insert("number", 7);
        inst.mark_step_done();
        inst.advance(1);
        assert!(inst.is_finished());

        let json = serde_json::to_string(&inst).unwrap();
        let restored: QueueInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cursor, inst.cursor);
        assert_eq!(restored.step_done, inst.step_done);
        assert_eq!(restored.direction, inst.direction);
        assert_eq!(restored.context, inst.context);
        assert!(!restored.is_finished());
    }
}
