use timeline::{ShaderChain, ShaderFragment};

/// Structural key for a keyframe's compiled programs. Two chains with equal
/// shapes compile to identical programs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderChainShape {
    fragments: Vec<ShaderFragment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Full-quad pass at source resolution into an intermediate target.
    Intermediate,
    /// Draws the keyframe's vertices into the output target.
    Final,
}

/// Fragments compiled together into one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub kind: StageKind,
    pub fragments: Vec<ShaderFragment>,
}

impl ShaderChainShape {
    pub fn new(chain: &ShaderChain) -> Self {
        Self {
            fragments: chain.fragments().to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Split at pass boundaries. A boundary on the last fragment has nothing
    /// after it and is ignored, so every non-empty shape ends in exactly one
    /// final stage.
    pub fn stages(&self) -> Vec<StagePlan> {
        let mut stages = Vec::new();
        let mut current = Vec::new();
        let last = self.fragments.len().saturating_sub(1);
        for (index, fragment) in self.fragments.iter().enumerate() {
            current.push(fragment.clone());
            if fragment.pass_boundary && index != last {
                stages.push(StagePlan {
                    kind: StageKind::Intermediate,
                    fragments: std::mem::take(&mut current),
                });
            }
        }
        if !current.is_empty() {
            stages.push(StagePlan {
                kind: StageKind::Final,
                fragments: current,
            });
        }
        stages
    }

    pub fn stage_count(&self) -> usize {
        self.stages().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(color: &str, pass_boundary: bool) -> ShaderFragment {
        ShaderFragment {
            color: color.to_string(),
            pass_boundary,
            ..ShaderFragment::default()
        }
    }

    #[test]
    fn single_stage_without_boundaries() {
        let chain: ShaderChain = vec![fragment("a", false), fragment("b", false)]
            .into_iter()
            .collect();
        let stages = ShaderChainShape::new(&chain).stages();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].kind, StageKind::Final);
        assert_eq!(stages[0].fragments.len(), 2);
    }

    #[test]
    fn boundaries_close_intermediate_stages() {
        let chain: ShaderChain = vec![
            fragment("a", true),
            fragment("b", false),
            fragment("c", true),
            fragment("d", false),
        ]
        .into_iter()
        .collect();
        let stages = ShaderChainShape::new(&chain).stages();
        let kinds: Vec<StageKind> = stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StageKind::Intermediate, StageKind::Intermediate, StageKind::Final]
        );
        assert_eq!(stages[1].fragments.len(), 2);
        assert_eq!(stages[2].fragments[0].color, "d");
    }

    #[test]
    fn trailing_boundary_is_ignored() {
        let chain: ShaderChain = vec![fragment("a", false), fragment("b", true)]
            .into_iter()
            .collect();
        let shape = ShaderChainShape::new(&chain);
        assert_eq!(shape.stage_count(), 1);
    }

    #[test]
    fn empty_shape_has_no_stages() {
        let shape = ShaderChainShape::new(&ShaderChain::new());
        assert!(shape.is_empty());
        assert!(shape.stages().is_empty());
    }
}
