//! 后端插件接口定义.
//!
//! floor/residue/time/mapping 四类后端各有一个 trait, 实例是无状态的
//! 单例, 由注册表按类型码索引. 每类后端分 pack/unpack (头部参数的
//! 序列化)、make_look (按 (mode, submap) 预计算工作状态) 与
//! forward/inverse (逐块编解码) 三层.
//!
//! 参数与 look 对象以 trait 对象持有, 具体后端内部通过 `as_any`
//! 向下转型取回自己的类型; 转型失败意味着注册表与参数集类型码
//! 不一致, 属于内部错误.

use std::any::Any;
use std::fmt;

use qin_core::{LsbBitReader, LsbBitWriter, QinResult};

use crate::block::Block;
use crate::config::CodecConfig;
use crate::registry::BackendRegistry;

/// 头部参数集的各类声明数量, 供 unpack 做范围校验
#[derive(Debug, Clone, Copy)]
pub struct SetupLimits {
    /// 声道数
    pub channels: usize,
    /// time 参数集数量
    pub times: usize,
    /// floor 参数集数量
    pub floors: usize,
    /// residue 参数集数量
    pub residues: usize,
}

/// floor 后端参数集 (头部级, 非逐块数据)
pub trait FloorParams: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// floor 后端逐流工作状态
pub trait FloorLook: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// floor 后端: 编解码声道的粗谱包络
pub trait FloorBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 序列化参数集到头部
    fn pack(&self, params: &dyn FloorParams, bw: &mut LsbBitWriter) -> QinResult<()>;

    /// 从头部反序列化参数集, 执行完整范围校验
    fn unpack(&self, br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn FloorParams>>;

    /// 为半谱长 `n2` 构建工作状态
    fn make_look(&self, params: &dyn FloorParams, n2: usize) -> QinResult<Box<dyn FloorLook>>;

    /// 编码一个声道的包络曲线
    ///
    /// 将 `curve` 的紧凑表示写入位流, 并把曲线原地替换为量化回写
    /// 后的重建值 (与解码端按位一致). 返回该声道本块是否携带信号;
    /// false 表示静音, 不参与 residue 编码.
    fn forward(
        &self,
        look: &dyn FloorLook,
        curve: &mut [f32],
        bw: &mut LsbBitWriter,
    ) -> QinResult<bool>;

    /// 解码一个声道的包络曲线到 `out`, 返回与编码端一致的 nonzero 标志
    fn inverse(
        &self,
        look: &dyn FloorLook,
        out: &mut [f32],
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<bool>;
}

/// residue 后端参数集
pub trait ResidueParams: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// residue 后端逐流工作状态
pub trait ResidueLook: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// residue 后端: 编解码 floor 归一化后的细节残差
///
/// 以 bundle (同一 submap 内 nonzero 的声道序号列表) 为单位工作,
/// 跨声道交织编码. bundle 为空时 forward/inverse 都是无操作.
pub trait ResidueBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 序列化参数集到头部
    fn pack(&self, params: &dyn ResidueParams, bw: &mut LsbBitWriter) -> QinResult<()>;

    /// 从头部反序列化参数集, 执行完整范围校验
    fn unpack(&self, br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn ResidueParams>>;

    /// 为半谱长 `n2` 构建工作状态
    fn make_look(&self, params: &dyn ResidueParams, n2: usize)
        -> QinResult<Box<dyn ResidueLook>>;

    /// 编码 bundle 内各声道的残差谱
    fn forward(
        &self,
        look: &dyn ResidueLook,
        channels: &[Vec<f32>],
        bundle: &[usize],
        bw: &mut LsbBitWriter,
    ) -> QinResult<()>;

    /// 解码 bundle 内各声道的残差谱 (写入 `channels` 的对应元素)
    fn inverse(
        &self,
        look: &dyn ResidueLook,
        channels: &mut [Vec<f32>],
        bundle: &[usize],
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<()>;
}

/// time 后端参数集
pub trait TimeParams: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// time 后端逐流工作状态
pub trait TimeLook: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// time 后端: 按 submap 的时域旁信息, 预留扩展点
pub trait TimeBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 序列化参数集到头部
    fn pack(&self, params: &dyn TimeParams, bw: &mut LsbBitWriter) -> QinResult<()>;

    /// 从头部反序列化参数集
    fn unpack(&self, br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn TimeParams>>;

    /// 构建工作状态
    fn make_look(&self, params: &dyn TimeParams, n2: usize) -> QinResult<Box<dyn TimeLook>>;

    /// 逐块编码钩子 (保留实现可为无操作)
    fn forward(&self, look: &dyn TimeLook, bw: &mut LsbBitWriter) -> QinResult<()>;

    /// 逐块解码钩子
    fn inverse(&self, look: &dyn TimeLook, br: &mut LsbBitReader<'_>) -> QinResult<()>;
}

/// mapping 后端参数集
pub trait MappingParams: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// mapping 后端逐流工作状态 (持有该 mode 的全部子后端 look)
pub trait MappingLook: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// mapping 后端: 声道映射协调器, 一个编码块的唯一入口
pub trait MappingBackend: Send + Sync {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 序列化 mapping 头 (线上格式按位固定)
    fn pack(
        &self,
        limits: &SetupLimits,
        params: &dyn MappingParams,
        bw: &mut LsbBitWriter,
    ) -> QinResult<()>;

    /// 反序列化 mapping 头, 执行完整范围校验
    fn unpack(
        &self,
        limits: &SetupLimits,
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<Box<dyn MappingParams>>;

    /// 为指定 mode 构建工作状态 (实例化所有子后端 look)
    fn make_look(
        &self,
        config: &CodecConfig,
        registry: &BackendRegistry,
        mode_index: usize,
    ) -> QinResult<Box<dyn MappingLook>>;

    /// 编码一个块: 加窗 → 变换 → 掩蔽 → floor → residue
    fn forward(&self, look: &dyn MappingLook, block: &mut Block, bw: &mut LsbBitWriter)
        -> QinResult<()>;

    /// 解码一个块: floor → residue → 逆变换 → 加窗
    fn inverse(
        &self,
        look: &dyn MappingLook,
        block: &mut Block,
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<()>;
}
