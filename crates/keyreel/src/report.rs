use serde::Serialize;
use timeline::AccumulatedState;

/// Printable view of an accumulated state.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub frame: i64,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub id: String,
    pub label: Option<String>,
    pub time: i64,
    pub layer: i32,
    pub source: &'static str,
    pub actions: Vec<&'static str>,
    pub effects: Vec<&'static str>,
    pub image: bool,
    pub audio: bool,
    pub seekable: bool,
}

impl StateReport {
    pub fn new(frame: i64, state: &AccumulatedState) -> Self {
        let entries = state
            .iter()
            .map(|entry| {
                let keyframe = &entry.keyframe;
                let capabilities = keyframe.capabilities();
                EntryReport {
                    id: keyframe.id().to_string(),
                    label: keyframe.label().map(str::to_string),
                    time: keyframe.time(),
                    layer: entry.layer,
                    source: keyframe.source().name(),
                    actions: keyframe.actions().iter().map(|action| action.name()).collect(),
                    effects: keyframe.effects().iter().map(|effect| effect.name()).collect(),
                    image: capabilities.image,
                    audio: capabilities.audio,
                    seekable: capabilities.seek,
                }
            })
            .collect();
        Self { frame, entries }
    }

    pub fn to_table(&self) -> String {
        if self.entries.is_empty() {
            return format!("frame {}: no active keyframes\n", self.frame);
        }
        let mut out = format!("frame {}: {} active\n", self.frame, self.entries.len());
        for entry in &self.entries {
            out.push_str(&format!(
                "  layer={:<3} time={:<6} {:<8} source={:<8} effects=[{}]\n",
                entry.layer,
                entry.time,
                entry.label.as_deref().unwrap_or("-"),
                entry.source,
                entry.effects.join(", "),
            ));
        }
        out
    }
}
