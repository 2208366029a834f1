//! Morph-target animation: openness and blink edges to smoothed influences.

use serde::{Deserialize, Serialize};

/// Mouth-shape morph targets driven by openness, checked by membership.
pub const MOUTH_TARGETS: &[&str] = &[
    "mouthOpen",
    "jawOpen",
    "viseme_aa",
    "viseme_O",
    "MouthOpen",
    "JawOpen",
];

/// Eyelid morph targets driven by blink edges.
pub const BLINK_TARGETS: &[&str] = &["eyesClosed", "eyeBlinkLeft", "eyeBlinkRight"];

/// A mesh exposing a morph-target dictionary.
pub trait MorphTargetSink {
    /// Name of the mesh in the scene graph.
    fn mesh_name(&self) -> &str;

    /// Index of the named morph target, `None` if the mesh lacks it.
    fn morph_target_index(&self, name: &str) -> Option<usize>;

    /// Whether the dictionary has any entry at all.
    fn has_morph_targets(&self) -> bool;

    fn influence(&self, index: usize) -> f32;

    fn set_influence(&mut self, index: usize, value: f32);
}

/// Animation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub mouth_targets: Vec<String>,
    pub blink_targets: Vec<String>,
    /// Per-frame interpolation factor for mouth shapes
    pub mouth_smoothing: f32,
    /// Per-frame interpolation factor for eyelids
    pub blink_smoothing: f32,
    /// Mesh name fragment preferred when several meshes carry morph targets
    pub preferred_mesh: String,
    /// Fallback mesh name fragment
    pub fallback_mesh: String,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            mouth_targets: MOUTH_TARGETS.iter().map(|s| s.to_string()).collect(),
            blink_targets: BLINK_TARGETS.iter().map(|s| s.to_string()).collect(),
            mouth_smoothing: 0.4,
            blink_smoothing: 0.5,
            preferred_mesh: "Head".to_string(),
            fallback_mesh: "Teeth".to_string(),
        }
    }
}

/// Which signal drives a morph target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphChannel {
    Mouth,
    Blink,
}

/// Animated state of one morph target.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTargetState {
    pub name: String,
    pub index: usize,
    pub channel: MorphChannel,
    pub current_influence: f32,
    pub target_influence: f32,
}

/// Pick the mesh to animate: one whose name contains the preferred
/// fragment, else the fallback fragment, else the first with any morph
/// targets.
pub fn select_mesh<S: MorphTargetSink>(meshes: &[S], config: &AnimationConfig) -> Option<usize> {
    let candidates = || {
        meshes
            .iter()
            .enumerate()
            .filter(|(_, mesh)| mesh.has_morph_targets())
    };
    candidates()
        .find(|(_, mesh)| mesh.mesh_name().contains(&config.preferred_mesh))
        .or_else(|| candidates().find(|(_, mesh)| mesh.mesh_name().contains(&config.fallback_mesh)))
        .or_else(|| candidates().next())
        .map(|(index, _)| index)
}

/// One exponential smoothing step. For `rate` in `(0, 1]` the result lies
/// between `current` and `target`.
pub fn smooth_step(current: f32, target: f32, rate: f32) -> f32 {
    current + (target - current) * rate
}

/// Maps openness and blink state onto a mesh's morph targets every frame.
pub struct MorphTargetAnimator {
    config: AnimationConfig,
    mesh: Option<String>,
    targets: Vec<MorphTargetState>,
}

impl MorphTargetAnimator {
    pub fn new(config: AnimationConfig) -> Self {
        Self {
            config,
            mesh: None,
            targets: Vec::new(),
        }
    }

    /// Resolve morph targets on `sink`. A no-op for the mesh already bound;
    /// use [`MorphTargetAnimator::reload`] after the mesh itself changed.
    pub fn bind(&mut self, sink: &dyn MorphTargetSink) {
        if self.mesh.as_deref() == Some(sink.mesh_name()) {
            return;
        }
        self.reload(sink);
    }

    /// Discard all state and resolve morph targets afresh.
    pub fn reload(&mut self, sink: &dyn MorphTargetSink) {
        let mut targets = Vec::new();
        let channels = [
            (MorphChannel::Mouth, &self.config.mouth_targets),
            (MorphChannel::Blink, &self.config.blink_targets),
        ];
        for (channel, names) in channels {
            for name in names {
                // Absent names are skipped.
                let Some(index) = sink.morph_target_index(name) else {
                    continue;
                };
                let current = sink.influence(index).clamp(0.0, 1.0);
                targets.push(MorphTargetState {
                    name: name.clone(),
                    index,
                    channel,
                    current_influence: current,
                    target_influence: current,
                });
            }
        }

        tracing::debug!(
            "Bound {} morph targets on mesh {}",
            targets.len(),
            sink.mesh_name()
        );
        self.mesh = Some(sink.mesh_name().to_string());
        self.targets = targets;
    }

    /// Advance one frame.
    pub fn update(&mut self, openness: f32, blinking: bool) {
        let mouth = if openness.is_finite() {
            openness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let blink = if blinking { 1.0 } else { 0.0 };

        for target in &mut self.targets {
            let (goal, rate) = match target.channel {
                MorphChannel::Mouth => (mouth, self.config.mouth_smoothing),
                MorphChannel::Blink => (blink, self.config.blink_smoothing),
            };
            target.target_influence = goal;
            target.current_influence = smooth_step(target.current_influence, goal, rate);
        }
    }

    /// Write current influences to the mesh.
    pub fn apply(&self, sink: &mut dyn MorphTargetSink) {
        for target in &self.targets {
            sink.set_influence(target.index, target.current_influence);
        }
    }

    /// Bind if needed, advance one frame and apply.
    pub fn frame(&mut self, sink: &mut dyn MorphTargetSink, openness: f32, blinking: bool) {
        self.bind(sink);
        self.update(openness, blinking);
        self.apply(sink);
    }

    pub fn targets(&self) -> &[MorphTargetState] {
        &self.targets
    }

    pub fn target(&self, name: &str) -> Option<&MorphTargetState> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn mesh(&self) -> Option<&str> {
        self.mesh.as_deref()
    }
}

impl Default for MorphTargetAnimator {
    fn default() -> Self {
        Self::new(AnimationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestMesh {
        name: String,
        dictionary: HashMap<String, usize>,
        influences: Vec<f32>,
    }

    impl TestMesh {
        fn new(name: &str, targets: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                dictionary: targets
                    .iter()
                    .enumerate()
                    .map(|(i, t)| (t.to_string(), i))
                    .collect(),
                influences: vec![0.0; targets.len()],
            }
        }
    }

    impl MorphTargetSink for TestMesh {
        fn mesh_name(&self) -> &str {
            &self.name
        }
        fn morph_target_index(&self, name: &str) -> Option<usize> {
            self.dictionary.get(name).copied()
        }
        fn has_morph_targets(&self) -> bool {
            !self.dictionary.is_empty()
        }
        fn influence(&self, index: usize) -> f32 {
            self.influences[index]
        }
        fn set_influence(&mut self, index: usize, value: f32) {
            self.influences[index] = value;
        }
    }

    #[test]
    fn test_absent_targets_are_skipped() {
        let mesh = TestMesh::new("Wolf3D_Head", &["jawOpen", "browInnerUp", "eyeBlinkLeft"]);
        let mut animator = MorphTargetAnimator::default();
        animator.bind(&mesh);

        let names: Vec<&str> = animator.targets().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["jawOpen", "eyeBlinkLeft"]);
    }

    #[test]
    fn test_converges_to_constant_target() {
        let mesh = TestMesh::new("Head", &["mouthOpen"]);
        let mut animator = MorphTargetAnimator::default();
        animator.bind(&mesh);

        let mut frames = 0;
        let mut previous = 0.0;
        while (animator.target("mouthOpen").unwrap().current_influence - 0.8).abs() >= 0.01 {
            animator.update(0.8, false);
            let current = animator.target("mouthOpen").unwrap().current_influence;
            assert!(current >= previous && current <= 0.8, "overshoot at frame {frames}");
            previous = current;
            frames += 1;
            assert!(frames <= 20);
        }
        // 0.8 * 0.6^n < 0.01
        assert_eq!(frames, 9);
    }

    #[test]
    fn test_blink_is_faster_than_mouth() {
        let mesh = TestMesh::new("Head", &["jawOpen", "eyesClosed"]);
        let mut animator = MorphTargetAnimator::default();
        animator.bind(&mesh);
        animator.update(1.0, true);

        assert!((animator.target("jawOpen").unwrap().current_influence - 0.4).abs() < 1e-6);
        assert!((animator.target("eyesClosed").unwrap().current_influence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_apply_writes_influences() {
        let mut mesh = TestMesh::new("Head", &["viseme_aa", "eyeBlinkRight"]);
        let mut animator = MorphTargetAnimator::default();
        animator.frame(&mut mesh, 1.0, true);

        assert!((mesh.influences[0] - 0.4).abs() < 1e-6);
        assert!((mesh.influences[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_state_survives_rebind_until_reload() {
        let mut mesh = TestMesh::new("Head", &["mouthOpen"]);
        let mut animator = MorphTargetAnimator::default();
        animator.frame(&mut mesh, 1.0, false);
        animator.frame(&mut mesh, 1.0, false);
        let before = animator.target("mouthOpen").unwrap().current_influence;

        animator.bind(&mesh);
        assert_eq!(animator.target("mouthOpen").unwrap().current_influence, before);

        let reloaded = TestMesh::new("Head", &["mouthOpen"]);
        animator.reload(&reloaded);
        assert_eq!(animator.target("mouthOpen").unwrap().current_influence, 0.0);
    }

    #[test]
    fn test_mesh_preference() {
        let config = AnimationConfig::default();
        let meshes = vec![
            TestMesh::new("Body", &[]),
            TestMesh::new("Wolf3D_Teeth", &["mouthOpen"]),
            TestMesh::new("Wolf3D_Head", &["mouthOpen"]),
        ];
        assert_eq!(select_mesh(&meshes, &config), Some(2));
        assert_eq!(select_mesh(&meshes[..2], &config), Some(1));

        let plain = vec![TestMesh::new("Body", &[]), TestMesh::new("Face", &["jawOpen"])];
        assert_eq!(select_mesh(&plain, &config), Some(1));
        assert_eq!(select_mesh(&plain[..1], &config), None);
    }

    #[test]
    fn test_non_finite_openness_is_silence() {
        let mesh = TestMesh::new("Head", &["mouthOpen"]);
        let mut animator = MorphTargetAnimator::default();
        animator.bind(&mesh);
        animator.update(f32::NAN, false);
        assert_eq!(animator.target("mouthOpen").unwrap().target_influence, 0.0);
    }
}
