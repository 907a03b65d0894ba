//! # qin-codec
//!
//! Qin 感知音频编码器的变换编码核心: MDCT 变换、心理声学掩蔽模型
//! 与可插拔的 floor/residue/time/mapping 后端.
//!
//! 编码块经加窗 MDCT 得到半谱, 心理声学模型给出掩蔽曲线, floor
//! 后端编码粗包络, residue 后端编码归一化细节; mapping 后端把这些
//! 环节按声道映射协调成一个独立的音频包. 所有后端经注册表按类型码
//! 分发, 线上格式在编解码两侧按位对称.
//!
//! ## 使用示例
//!
//! ```rust
//! use qin_codec::config::{
//!     CodecConfig, FloorSetup, MappingSetup, ModeParams, ResidueSetup, TimeSetup,
//! };
//! use qin_codec::floor0::Floor0Params;
//! use qin_codec::mapping0::Mapping0Params;
//! use qin_codec::psy::PsyParams;
//! use qin_codec::residue0::Residue0Params;
//! use qin_codec::time0::Time0Params;
//! use qin_codec::registry::BackendRegistry;
//! use qin_codec::stream::{BlockFlags, StreamContext};
//!
//! let config = CodecConfig {
//!     channels: 1,
//!     sample_rate: 44100,
//!     blocksizes: [256, 256],
//!     psys: vec![PsyParams::default()],
//!     times: vec![TimeSetup { type_code: 0, params: Box::new(Time0Params) }],
//!     floors: vec![FloorSetup {
//!         type_code: 0,
//!         params: Box::new(Floor0Params { posts: 16, amp_bits: 6 }),
//!     }],
//!     residues: vec![ResidueSetup {
//!         type_code: 0,
//!         params: Box::new(Residue0Params {
//!             begin: 0,
//!             end: 128,
//!             partition_size: 32,
//!             value_bits: 6,
//!         }),
//!     }],
//!     mappings: vec![MappingSetup {
//!         type_code: 0,
//!         params: Box::new(Mapping0Params {
//!             submaps: 1,
//!             mux: vec![0],
//!             time_submap: vec![0],
//!             floor_submap: vec![0],
//!             residue_submap: vec![0],
//!             psy_submap: vec![0],
//!         }),
//!     }],
//!     modes: vec![ModeParams { block_flag: false, mapping: 0 }],
//! };
//!
//! let registry = BackendRegistry::builtin();
//! let mut enc = StreamContext::begin_stream(config, &registry).unwrap();
//!
//! // 静音输入编码再解码, 输出精确为零
//! let pcm = vec![vec![0.0f32; 256]];
//! let flags = BlockFlags { mode: 0, prev_window_long: false, next_window_long: false };
//! let packet = enc.encode_block(&pcm, flags).unwrap();
//! let decoded = enc.decode_block(&packet).unwrap();
//! assert!(decoded.pcm[0].iter().all(|&x| x == 0.0));
//! ```

pub mod backend;
pub mod block;
pub mod config;
pub mod floor0;
pub mod mapping0;
pub mod psy;
pub mod registry;
pub mod residue0;
pub mod scales;
pub mod stream;
pub mod time0;
pub mod transform;
pub mod window;

// 重导出常用类型
pub use block::Block;
pub use config::{CodecConfig, ModeParams};
pub use registry::BackendRegistry;
pub use stream::{BlockFlags, DecodedBlock, StreamContext};
pub use transform::{Mdct, SpectralEstimator};
