use crate::context::EngineContext;
use crate::keyframe::Keyframe;
use crate::ops::Action;
use crate::state::AccumulatedState;

/// Make the owning keyframe participate at `layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowAction {
    pub layer: i32,
}

impl Action for ShowAction {
    fn name(&self) -> &'static str {
        "show"
    }

    fn apply(
        &self,
        mut state: AccumulatedState,
        keyframe: &Keyframe,
        _ctx: &EngineContext,
        _relative_frame: i64,
    ) -> AccumulatedState {
        state.upsert(keyframe.clone(), self.layer);
        state
    }
}

/// Drop every participant carrying `label`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HideAction {
    pub label: String,
}

impl Action for HideAction {
    fn name(&self) -> &'static str {
        "hide"
    }

    fn apply(
        &self,
        mut state: AccumulatedState,
        _keyframe: &Keyframe,
        _ctx: &EngineContext,
        _relative_frame: i64,
    ) -> AccumulatedState {
        state.retain(|entry| entry.keyframe.label() != Some(self.label.as_str()));
        state
    }
}

/// Scene cut: nothing before this keyframe stays on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearAction;

impl Action for ClearAction {
    fn name(&self) -> &'static str {
        "clear"
    }

    fn apply(
        &self,
        mut state: AccumulatedState,
        _keyframe: &Keyframe,
        _ctx: &EngineContext,
        _relative_frame: i64,
    ) -> AccumulatedState {
        state.clear();
        state
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetLayerAction {
    pub label: String,
    pub layer: i32,
}

impl Action for SetLayerAction {
    fn name(&self) -> &'static str {
        "layer"
    }

    fn apply(
        &self,
        mut state: AccumulatedState,
        _keyframe: &Keyframe,
        _ctx: &EngineContext,
        _relative_frame: i64,
    ) -> AccumulatedState {
        for entry in state.iter_mut() {
            if entry.keyframe.label() == Some(self.label.as_str()) {
                entry.layer = self.layer;
            }
        }
        state
    }
}
