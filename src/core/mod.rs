pub mod animation;
pub mod audio;
pub mod control;
pub mod human;
pub mod media;
pub mod orchestrator;
pub mod signaling;
pub mod transport;

// Re-export commonly used types for convenience
pub use animation::{
    AnimationConfig, BlinkConfig, BlinkScheduler, MorphTargetAnimator, MorphTargetSink,
    MorphTargetState,
};

pub use audio::{
    AnalysisConfig, AudioAnalysisDriver, AudioContext, AudioContextFactory, AudioError,
    AudioResult, FrequencyAnalyzer, PcmAudioContext, PcmStream,
};

pub use control::{
    ChannelError, ChannelResult, ChannelState, ControlChannel, ControlMessage,
    ControlMessageCallback, ControlSubstrate, SubstrateEvent, WebSocketSubstrate,
};

pub use human::{HumanInput, HumanInputClient, HumanInputError, HumanInputResult};

pub use media::{MediaKind, MediaStream, MediaTrackBinding, SharedMediaStream};

pub use orchestrator::{
    AvatarMode, AvatarOrchestrator, AvatarStatus, FaultBoundary, FaultState, MediaStatus,
};

pub use signaling::{
    SessionError, SessionResult, SessionState, SignalingConfig, SignalingSession,
};

pub use transport::{
    DataChannelHandle, IceGatheringState, PeerTransport, SessionDescription, TransportError,
    TransportFactory, TransportResult,
};
