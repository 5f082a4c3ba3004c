pub mod analyser;
pub mod frame_loop;
pub mod monitor;
pub mod playback;
pub mod sampler;
pub mod stereo;
