//! 编码块: 一帧音频在管线内的瞬态载体.
//!
//! 块由协调器在块开始时创建、块结束时丢弃, 绝不跨块共享; 跨块
//! 延续的只有显式穿线的运行峰值.

use crate::scales::SILENCE_DB;

/// 一个编码块的瞬态状态
#[derive(Debug, Clone)]
pub struct Block {
    /// 当前块是否为长块
    pub block_flag: bool,
    /// 前一块是否为长块 (仅长块有意义, 决定左窗斜率)
    pub prev_flag: bool,
    /// 后一块是否为长块 (仅长块有意义, 决定右窗斜率)
    pub next_flag: bool,
    /// 每声道 PCM 样本, 长度 = 当前块长
    ///
    /// 编码路径上是输入; 解码路径上由协调器填充 (已加窗, 待外层
    /// 重叠累加).
    pub pcm: Vec<Vec<f32>>,
    /// 每声道 nonzero 标志, 由 floor 后端设置, 决定 bundle 成员资格
    pub nonzero: Vec<bool>,
    /// 运行峰值 (dB), 编码端跨块显式携带
    pub peak_db: f32,
}

impl Block {
    /// 创建编码输入块
    pub fn for_encode(
        pcm: Vec<Vec<f32>>,
        block_flag: bool,
        prev_flag: bool,
        next_flag: bool,
        peak_db: f32,
    ) -> Self {
        let channels = pcm.len();
        Self {
            block_flag,
            prev_flag,
            next_flag,
            pcm,
            nonzero: vec![false; channels],
            peak_db,
        }
    }

    /// 创建解码输出块 (PCM 待协调器填充)
    pub fn for_decode(channels: usize, block_flag: bool, prev_flag: bool, next_flag: bool) -> Self {
        Self {
            block_flag,
            prev_flag,
            next_flag,
            pcm: vec![Vec::new(); channels],
            nonzero: vec![false; channels],
            peak_db: SILENCE_DB,
        }
    }
}
