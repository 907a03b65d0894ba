//! 编码配置: 每条流一份的不可变参数与 setup 头的序列化.
//!
//! 配置持有各类后端参数集 (以 trait 对象保存, 配类型码)、mapping
//! 与 mode 列表. 所有逐块操作只读配置; 配置错误一律在
//! unpack/begin_stream 阶段拒绝, 不产生半初始化的上下文.
//!
//! setup 头布局 (LSB-first):
//!
//! ```text
//! preamble : channels(8) sample_rate(32) log2_short(4) log2_long(4)
//! times    : count-1(6), 每项: type(16) + 后端参数
//! floors   : count-1(6), 每项: type(16) + 后端参数
//! residues : count-1(6), 每项: type(16) + 后端参数
//! mappings : count-1(6), 每项: type(16) + 后端参数
//! modes    : count-1(6), 每项: block_flag(1) window_type(16)
//!            transform_type(16) mapping(8)
//! framing  : 1 位, 必须为 1
//! ```
//!
//! 心理声学参数仅编码端使用, 不进入线上格式; unpack 得到的配置
//! 带一个默认参数集.

use qin_core::{LsbBitReader, LsbBitWriter, QinError, QinResult};

use crate::backend::{
    FloorParams, MappingParams, ResidueParams, SetupLimits, TimeParams,
};
use crate::psy::PsyParams;
use crate::registry::BackendRegistry;

/// 允许的块长范围 (2 的幂指数)
const MIN_LOG2_BLOCKSIZE: u32 = 6;
const MAX_LOG2_BLOCKSIZE: u32 = 13;

/// 一个 time 参数集及其后端类型码
#[derive(Debug)]
pub struct TimeSetup {
    pub type_code: u16,
    pub params: Box<dyn TimeParams>,
}

/// 一个 floor 参数集及其后端类型码
#[derive(Debug)]
pub struct FloorSetup {
    pub type_code: u16,
    pub params: Box<dyn FloorParams>,
}

/// 一个 residue 参数集及其后端类型码
#[derive(Debug)]
pub struct ResidueSetup {
    pub type_code: u16,
    pub params: Box<dyn ResidueParams>,
}

/// 一个 mapping 参数集及其后端类型码
#[derive(Debug)]
pub struct MappingSetup {
    pub type_code: u16,
    pub params: Box<dyn MappingParams>,
}

/// 编码 mode: 选择块长与 mapping
#[derive(Debug, Clone)]
pub struct ModeParams {
    /// true = 长块
    pub block_flag: bool,
    /// mapping 参数集索引
    pub mapping: usize,
}

/// 每条流一份的不可变编码配置
#[derive(Debug)]
pub struct CodecConfig {
    /// 声道数
    pub channels: usize,
    /// 采样率
    pub sample_rate: u32,
    /// 块长 [短, 长], 均为 2 的幂, 短 ≤ 长
    pub blocksizes: [usize; 2],
    /// 心理声学参数集 (仅编码端, 不序列化)
    pub psys: Vec<PsyParams>,
    /// time 参数集
    pub times: Vec<TimeSetup>,
    /// floor 参数集
    pub floors: Vec<FloorSetup>,
    /// residue 参数集
    pub residues: Vec<ResidueSetup>,
    /// mapping 参数集
    pub mappings: Vec<MappingSetup>,
    /// mode 列表
    pub modes: Vec<ModeParams>,
}

impl CodecConfig {
    /// 校验配置的结构性不变量 (后端参数内部约束由各自 unpack /
    /// make_look 把关)
    pub fn validate(&self) -> QinResult<()> {
        if self.channels == 0 || self.channels > 255 {
            return Err(QinError::InvalidData(format!(
                "声道数非法: {}",
                self.channels,
            )));
        }
        if self.sample_rate == 0 {
            return Err(QinError::InvalidData("采样率不能为 0".into()));
        }
        for &n in &self.blocksizes {
            if !n.is_power_of_two()
                || n.trailing_zeros() < MIN_LOG2_BLOCKSIZE
                || n.trailing_zeros() > MAX_LOG2_BLOCKSIZE
            {
                return Err(QinError::InvalidData(format!("块长非法: {}", n)));
            }
        }
        if self.blocksizes[0] > self.blocksizes[1] {
            return Err(QinError::InvalidData(format!(
                "短块长 {} 大于长块长 {}",
                self.blocksizes[0], self.blocksizes[1],
            )));
        }
        if self.psys.is_empty()
            || self.times.is_empty()
            || self.floors.is_empty()
            || self.residues.is_empty()
            || self.mappings.is_empty()
            || self.modes.is_empty()
        {
            return Err(QinError::InvalidData(
                "参数集/映射/mode 列表不能为空".into(),
            ));
        }
        if self.times.len() > 64
            || self.floors.len() > 64
            || self.residues.len() > 64
            || self.mappings.len() > 64
            || self.modes.len() > 64
        {
            return Err(QinError::InvalidData("参数集数量超出 6 位计数范围".into()));
        }
        for (i, mode) in self.modes.iter().enumerate() {
            if mode.mapping >= self.mappings.len() {
                return Err(QinError::InvalidData(format!(
                    "mode {} 的 mapping 索引越界: {}",
                    i, mode.mapping,
                )));
            }
        }
        Ok(())
    }

    /// 各类参数集数量, 供 mapping unpack 做范围校验
    pub fn limits(&self) -> SetupLimits {
        SetupLimits {
            channels: self.channels,
            times: self.times.len(),
            floors: self.floors.len(),
            residues: self.residues.len(),
        }
    }
}

/// 序列化完整 setup 头
pub fn pack_setup(
    config: &CodecConfig,
    registry: &BackendRegistry,
    bw: &mut LsbBitWriter,
) -> QinResult<()> {
    config.validate()?;
    let limits = config.limits();

    bw.write_bits(config.channels as u32, 8);
    bw.write_bits(config.sample_rate, 32);
    bw.write_bits(config.blocksizes[0].trailing_zeros(), 4);
    bw.write_bits(config.blocksizes[1].trailing_zeros(), 4);

    bw.write_bits(config.times.len() as u32 - 1, 6);
    for t in &config.times {
        bw.write_bits(u32::from(t.type_code), 16);
        registry.time_by_type(t.type_code)?.pack(t.params.as_ref(), bw)?;
    }

    bw.write_bits(config.floors.len() as u32 - 1, 6);
    for f in &config.floors {
        bw.write_bits(u32::from(f.type_code), 16);
        registry.floor_by_type(f.type_code)?.pack(f.params.as_ref(), bw)?;
    }

    bw.write_bits(config.residues.len() as u32 - 1, 6);
    for r in &config.residues {
        bw.write_bits(u32::from(r.type_code), 16);
        registry
            .residue_by_type(r.type_code)?
            .pack(r.params.as_ref(), bw)?;
    }

    bw.write_bits(config.mappings.len() as u32 - 1, 6);
    for m in &config.mappings {
        bw.write_bits(u32::from(m.type_code), 16);
        registry
            .mapping_by_type(m.type_code)?
            .pack(&limits, m.params.as_ref(), bw)?;
    }

    bw.write_bits(config.modes.len() as u32 - 1, 6);
    for mode in &config.modes {
        bw.write_flag(mode.block_flag);
        bw.write_bits(0, 16); // window_type, 保留
        bw.write_bits(0, 16); // transform_type, 保留
        bw.write_bits(mode.mapping as u32, 8);
    }

    bw.write_flag(true); // framing
    Ok(())
}

/// 反序列化 setup 头, 执行完整范围校验
///
/// 任何越界索引、非法类型码或保留字段非 0 都会使整个头被拒绝.
pub fn unpack_setup(
    br: &mut LsbBitReader<'_>,
    registry: &BackendRegistry,
) -> QinResult<CodecConfig> {
    let channels = br.read_bits(8)? as usize;
    if channels == 0 {
        return Err(QinError::InvalidData("setup 头声道数为 0".into()));
    }
    let sample_rate = br.read_bits(32)?;
    if sample_rate == 0 {
        return Err(QinError::InvalidData("setup 头采样率为 0".into()));
    }
    let log2_short = br.read_bits(4)?;
    let log2_long = br.read_bits(4)?;
    if !(MIN_LOG2_BLOCKSIZE..=MAX_LOG2_BLOCKSIZE).contains(&log2_short)
        || !(MIN_LOG2_BLOCKSIZE..=MAX_LOG2_BLOCKSIZE).contains(&log2_long)
        || log2_short > log2_long
    {
        return Err(QinError::InvalidData(format!(
            "setup 头块长指数非法: {}/{}",
            log2_short, log2_long,
        )));
    }
    let blocksizes = [1usize << log2_short, 1usize << log2_long];

    let time_count = br.read_bits(6)? as usize + 1;
    let mut times = Vec::with_capacity(time_count);
    for _ in 0..time_count {
        let type_code = br.read_bits(16)? as u16;
        let backend = registry.time_by_type(type_code)?;
        times.push(TimeSetup {
            type_code,
            params: backend.unpack(br)?,
        });
    }

    let floor_count = br.read_bits(6)? as usize + 1;
    let mut floors = Vec::with_capacity(floor_count);
    for _ in 0..floor_count {
        let type_code = br.read_bits(16)? as u16;
        let backend = registry.floor_by_type(type_code)?;
        floors.push(FloorSetup {
            type_code,
            params: backend.unpack(br)?,
        });
    }

    let residue_count = br.read_bits(6)? as usize + 1;
    let mut residues = Vec::with_capacity(residue_count);
    for _ in 0..residue_count {
        let type_code = br.read_bits(16)? as u16;
        let backend = registry.residue_by_type(type_code)?;
        residues.push(ResidueSetup {
            type_code,
            params: backend.unpack(br)?,
        });
    }

    let limits = SetupLimits {
        channels,
        times: times.len(),
        floors: floors.len(),
        residues: residues.len(),
    };

    let mapping_count = br.read_bits(6)? as usize + 1;
    let mut mappings = Vec::with_capacity(mapping_count);
    for _ in 0..mapping_count {
        let type_code = br.read_bits(16)? as u16;
        let backend = registry.mapping_by_type(type_code)?;
        mappings.push(MappingSetup {
            type_code,
            params: backend.unpack(&limits, br)?,
        });
    }

    let mode_count = br.read_bits(6)? as usize + 1;
    let mut modes = Vec::with_capacity(mode_count);
    for i in 0..mode_count {
        let block_flag = br.read_flag()?;
        let window_type = br.read_bits(16)?;
        let transform_type = br.read_bits(16)?;
        if window_type != 0 || transform_type != 0 {
            return Err(QinError::InvalidData(format!(
                "mode {} 的 window/transform 类型必须为 0",
                i,
            )));
        }
        let mapping = br.read_bits(8)? as usize;
        if mapping >= mappings.len() {
            return Err(QinError::InvalidData(format!(
                "mode {} 的 mapping 索引越界: {}",
                i, mapping,
            )));
        }
        modes.push(ModeParams {
            block_flag,
            mapping,
        });
    }

    if !br.read_flag()? {
        return Err(QinError::InvalidData("setup 头 framing 位非法".into()));
    }

    let config = CodecConfig {
        channels,
        sample_rate,
        blocksizes,
        psys: vec![PsyParams::default()],
        times,
        floors,
        residues,
        mappings,
        modes,
    };
    config.validate()?;
    Ok(config)
}
