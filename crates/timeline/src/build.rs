//! Turns project-file keyframe specs into live operators.

use std::path::Path;
use std::sync::Arc;

use projectfile::{ActionSpec, EffectSpec, KeyframeSpec, ProjectFile, SourceSpec};

use crate::builtin::{
    ClearAction, FadeInEffect, FrameSequenceSource, GainEffect, HideAction, ImageFileSource,
    ImageSequenceDecoder, PcmFileReader, PcmSource, QuadEffect, SetLayerAction, ShaderEffect,
    ShowAction, SolidSource, ToneSource,
};
use crate::context::EngineContext;
use crate::keyframe::Keyframe;
use crate::ops::{Action, Effect, OperatorError, ShaderFragment, Source};
use crate::timeline::Timeline;
use crate::TimelineError;

impl Timeline {
    /// Build every `[[keyframes]]` entry. Relative paths resolve against
    /// `base_dir`, normally the directory holding the project file.
    pub fn from_project(project: &ProjectFile, base_dir: &Path) -> Result<Self, TimelineError> {
        let ctx = EngineContext::from_output(&project.output);
        let mut timeline = Timeline::new();
        for (index, spec) in project.keyframes.iter().enumerate() {
            let keyframe = keyframe_from_spec(spec, &ctx, base_dir).map_err(|source| {
                TimelineError::Build {
                    keyframe: spec
                        .label
                        .clone()
                        .unwrap_or_else(|| format!("#{index}")),
                    source,
                }
            })?;
            timeline.insert(keyframe)?;
        }
        tracing::info!(keyframes = timeline.len(), "timeline loaded");
        Ok(timeline)
    }
}

pub fn keyframe_from_spec(
    spec: &KeyframeSpec,
    ctx: &EngineContext,
    base_dir: &Path,
) -> Result<Keyframe, OperatorError> {
    let mut keyframe = Keyframe::new(spec.time, source_from_spec(&spec.source, ctx, base_dir)?);
    if let Some(label) = &spec.label {
        keyframe = keyframe.with_label(label.clone());
    }
    for action in &spec.actions {
        keyframe = keyframe.with_action(action_from_spec(action));
    }
    for effect in &spec.effects {
        keyframe = keyframe.with_effect(effect_from_spec(effect));
    }
    Ok(keyframe)
}

pub fn source_from_spec(
    spec: &SourceSpec,
    ctx: &EngineContext,
    base_dir: &Path,
) -> Result<Arc<dyn Source>, OperatorError> {
    let source: Arc<dyn Source> = match spec {
        SourceSpec::Solid {
            width,
            height,
            rgba,
        } => Arc::new(SolidSource::new(*width, *height, *rgba)),
        SourceSpec::Image { path } => Arc::new(ImageFileSource::open(&base_dir.join(path))?),
        SourceSpec::Frames {
            directory,
            extension,
            frame_rate,
        } => {
            let decoder = ImageSequenceDecoder::open(&base_dir.join(directory), extension)?;
            Arc::new(FrameSequenceSource::new(Box::new(decoder), *frame_rate))
        }
        SourceSpec::Tone {
            frequency,
            amplitude,
        } => Arc::new(ToneSource::new(*frequency, *amplitude)),
        SourceSpec::Pcm {
            path,
            channels,
            sample_rate,
        } => {
            if *sample_rate != ctx.sample_rate {
                return Err(OperatorError::failed(
                    "pcm",
                    format!(
                        "{} is {sample_rate} Hz but the project mixes at {} Hz",
                        path.display(),
                        ctx.sample_rate
                    ),
                ));
            }
            let reader = PcmFileReader::open(&base_dir.join(path), *channels, *sample_rate)?;
            Arc::new(PcmSource::new(Box::new(reader)))
        }
    };
    Ok(source)
}

pub fn action_from_spec(spec: &ActionSpec) -> Arc<dyn Action> {
    match spec {
        ActionSpec::Show { layer } => Arc::new(ShowAction { layer: *layer }),
        ActionSpec::Hide { label } => Arc::new(HideAction {
            label: label.clone(),
        }),
        ActionSpec::Clear => Arc::new(ClearAction),
        ActionSpec::Layer { label, layer } => Arc::new(SetLayerAction {
            label: label.clone(),
            layer: *layer,
        }),
    }
}

pub fn effect_from_spec(spec: &EffectSpec) -> Arc<dyn Effect> {
    match spec {
        EffectSpec::Quad {
            x,
            y,
            z,
            width,
            height,
            rotation,
            relative_width,
            relative_height,
        } => Arc::new(QuadEffect {
            x: *x,
            y: *y,
            z: *z,
            width: *width,
            height: *height,
            rotation: *rotation,
            relative_width: *relative_width,
            relative_height: *relative_height,
        }),
        EffectSpec::Shader {
            declarations,
            uv,
            color,
            new_pass,
        } => Arc::new(ShaderEffect {
            fragment: ShaderFragment {
                declarations: declarations.clone(),
                uv: uv.clone(),
                color: color.clone(),
                pass_boundary: *new_pass,
            },
        }),
        EffectSpec::Gain { amount } => Arc::new(GainEffect { amount: *amount }),
        EffectSpec::FadeIn { frames } => Arc::new(FadeInEffect { frames: *frames }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::compute_active_state;

    const PROJECT: &str = r#"
version = 1

[[keyframes]]
time = 100
source = { kind = "solid", width = 8, height = 8 }
actions = [{ kind = "show", layer = 0 }]

[[keyframes]]
time = 0
label = "back"
source = { kind = "solid", width = 8, height = 8, rgba = [0, 0, 0, 255] }
actions = [{ kind = "show", layer = 1 }]
effects = [{ kind = "quad" }]

[[keyframes]]
time = 50
source = { kind = "tone", frequency = 220 }
actions = [{ kind = "show" }]
effects = [{ kind = "gain", amount = 0.5 }]
"#;

    #[test]
    fn builds_timeline_from_project() {
        let project = ProjectFile::from_toml_str(PROJECT).unwrap();
        let mut timeline = Timeline::from_project(&project, Path::new(".")).unwrap();
        assert_eq!(timeline.len(), 3);

        let ctx = EngineContext::from_output(&project.output);
        let state = compute_active_state(&mut timeline, 75, &ctx);
        let times: Vec<i64> = state.keyframes().map(Keyframe::time).collect();
        assert_eq!(times, vec![50, 0]);
        assert_eq!(state.entries()[1].keyframe.label(), Some("back"));
        assert!(state.entries()[1].keyframe.capabilities().composite);
        assert!(state.entries()[0].keyframe.capabilities().sound);
    }

    #[test]
    fn missing_image_names_the_keyframe() {
        let project = ProjectFile::from_toml_str(
            r#"
version = 1

[[keyframes]]
time = 0
label = "poster"
source = { kind = "image", path = "does-not-exist.png" }
"#,
        )
        .unwrap();
        let err = Timeline::from_project(&project, Path::new("/nonexistent")).unwrap_err();
        match err {
            TimelineError::Build { keyframe, .. } => assert_eq!(keyframe, "poster"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn pcm_must_match_mix_rate() {
        let spec = SourceSpec::Pcm {
            path: "clip.f32".into(),
            channels: 2,
            sample_rate: 44_100,
        };
        let result = source_from_spec(&spec, &EngineContext::default(), Path::new("."));
        assert!(result.is_err());
    }
}
