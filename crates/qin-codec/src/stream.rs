//! 流上下文: 一条流的全部逐块编解码状态.
//!
//! begin_stream 在配置校验通过后一次性实例化所有 mode 的 mapping
//! 工作状态, 逐块路径上不再做任何惰性初始化, 配置错误不可能拖到
//! 编解码途中才暴露.
//!
//! 音频包头布局 (LSB-first):
//!
//! ```text
//! packet_type(1)  必须为 0
//! mode(ilog(modes-1))
//! 若该 mode 为长块: prev_flag(1) next_flag(1)
//! ```
//!
//! 上下文只保存跨块显式穿线的运行峰值; 重叠累加由调用方完成.

use log::debug;

use qin_core::{ilog, LsbBitReader, LsbBitWriter, QinError, QinResult};

use crate::backend::MappingLook;
use crate::block::Block;
use crate::config::{pack_setup, unpack_setup, CodecConfig};
use crate::registry::BackendRegistry;
use crate::scales::SILENCE_DB;

/// 编码一个块的模式选择与邻块信息
#[derive(Debug, Clone, Copy)]
pub struct BlockFlags {
    /// mode 索引
    pub mode: usize,
    /// 前一块是否为长块 (仅当前 mode 为长块时进入位流)
    pub prev_window_long: bool,
    /// 后一块是否为长块 (仅当前 mode 为长块时进入位流)
    pub next_window_long: bool,
}

/// 一个解码完成的块
#[derive(Debug)]
pub struct DecodedBlock {
    /// 每声道已加窗的 PCM, 长度 = 该 mode 的块长, 待重叠累加
    pub pcm: Vec<Vec<f32>>,
    /// 该块是否为长块
    pub block_flag: bool,
    /// 每声道 nonzero 标志
    pub nonzero: Vec<bool>,
}

/// 一条流的编解码上下文
pub struct StreamContext<'a> {
    registry: &'a BackendRegistry,
    config: CodecConfig,
    /// 按 mode 索引的 mapping 工作状态, begin_stream 时全部建好
    mode_looks: Vec<Box<dyn MappingLook>>,
    /// 编码端跨块运行峰值 (dB)
    peak_db: f32,
}

impl<'a> StreamContext<'a> {
    /// 用给定配置开始一条流
    pub fn begin_stream(config: CodecConfig, registry: &'a BackendRegistry) -> QinResult<Self> {
        config.validate()?;
        let mut mode_looks = Vec::with_capacity(config.modes.len());
        for (i, mode) in config.modes.iter().enumerate() {
            let backend = registry.mapping_by_type(config.mappings[mode.mapping].type_code)?;
            mode_looks.push(backend.make_look(&config, registry, i)?);
        }
        debug!(
            "流上下文建立: {} 声道, 块长 {:?}, {} 个 mode",
            config.channels,
            config.blocksizes,
            config.modes.len(),
        );
        Ok(Self {
            registry,
            config,
            mode_looks,
            peak_db: SILENCE_DB,
        })
    }

    /// 从 setup 头开始一条流 (解码侧入口)
    pub fn from_setup_header(data: &[u8], registry: &'a BackendRegistry) -> QinResult<Self> {
        let mut br = LsbBitReader::new(data);
        let config = unpack_setup(&mut br, registry)?;
        Self::begin_stream(config, registry)
    }

    /// 序列化本流的 setup 头 (编码侧入口)
    pub fn setup_header(&self) -> QinResult<Vec<u8>> {
        let mut bw = LsbBitWriter::new();
        pack_setup(&self.config, self.registry, &mut bw)?;
        Ok(bw.finish())
    }

    /// 流配置
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    fn mode_bits(&self) -> u32 {
        ilog(self.config.modes.len() as u32 - 1)
    }

    /// 编码一个块为独立的音频包
    ///
    /// `pcm` 每声道样本数必须等于所选 mode 的块长. 输入应已按
    /// 50% 重叠切块, 加窗在内部完成.
    pub fn encode_block(&mut self, pcm: &[Vec<f32>], flags: BlockFlags) -> QinResult<Vec<u8>> {
        let mode = self
            .config
            .modes
            .get(flags.mode)
            .ok_or_else(|| QinError::InvalidArgument(format!("mode 索引越界: {}", flags.mode)))?;
        let block_flag = mode.block_flag;
        let n = self.config.blocksizes[usize::from(block_flag)];
        if pcm.len() != self.config.channels {
            return Err(QinError::InvalidArgument(format!(
                "输入声道数 {} 与配置 {} 不符",
                pcm.len(),
                self.config.channels,
            )));
        }
        for (ch, c) in pcm.iter().enumerate() {
            if c.len() != n {
                return Err(QinError::InvalidArgument(format!(
                    "声道 {} 样本数 {} 与块长 {} 不符",
                    ch,
                    c.len(),
                    n,
                )));
            }
        }
        // 短块左右邻必为短窗斜率, 标志只在长块有意义
        let prev_flag = block_flag && flags.prev_window_long;
        let next_flag = block_flag && flags.next_window_long;

        let mut bw = LsbBitWriter::new();
        bw.write_flag(false); // 音频包标志
        bw.write_bits(flags.mode as u32, self.mode_bits());
        if block_flag {
            bw.write_flag(prev_flag);
            bw.write_flag(next_flag);
        }

        let mut block = Block::for_encode(
            pcm.to_vec(),
            block_flag,
            prev_flag,
            next_flag,
            self.peak_db,
        );
        let backend = self
            .registry
            .mapping_by_type(self.config.mappings[mode.mapping].type_code)?;
        backend.forward(self.mode_looks[flags.mode].as_ref(), &mut block, &mut bw)?;
        self.peak_db = block.peak_db;
        Ok(bw.finish())
    }

    /// 解码一个音频包
    ///
    /// 返回的 PCM 已加窗, 由调用方与相邻块做 50% 重叠累加.
    pub fn decode_block(&mut self, packet: &[u8]) -> QinResult<DecodedBlock> {
        let mut br = LsbBitReader::new(packet);
        if br.read_flag()? {
            return Err(QinError::InvalidData("不是音频包".into()));
        }
        let mode_index = br.read_bits(self.mode_bits())? as usize;
        let mode = self.config.modes.get(mode_index).ok_or_else(|| {
            QinError::InvalidData(format!("包内 mode 索引越界: {}", mode_index))
        })?;
        let block_flag = mode.block_flag;
        let (prev_flag, next_flag) = if block_flag {
            (br.read_flag()?, br.read_flag()?)
        } else {
            (false, false)
        };

        let mut block =
            Block::for_decode(self.config.channels, block_flag, prev_flag, next_flag);
        let backend = self
            .registry
            .mapping_by_type(self.config.mappings[mode.mapping].type_code)?;
        backend.inverse(self.mode_looks[mode_index].as_ref(), &mut block, &mut br)?;

        Ok(DecodedBlock {
            pcm: block.pcm,
            block_flag,
            nonzero: block.nonzero,
        })
    }
}
