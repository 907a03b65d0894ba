//! 后端注册表: 类型码到后端单例的静态映射.
//!
//! 线上格式中的后端类型码即注册表内的下标. 注册表构建后不可变,
//! 所有后端实例无状态, 以 `&'static` 引用分发. 越界类型码一律
//! 视为损坏数据拒绝.

use qin_core::{QinError, QinResult};

use crate::backend::{FloorBackend, MappingBackend, ResidueBackend, TimeBackend};
use crate::floor0::Floor0;
use crate::mapping0::Mapping0;
use crate::residue0::Residue0;
use crate::time0::Time0;

static FLOOR0: Floor0 = Floor0;
static RESIDUE0: Residue0 = Residue0;
static TIME0: Time0 = Time0;
static MAPPING0: Mapping0 = Mapping0;

/// 按类型码索引的后端集合
pub struct BackendRegistry {
    floors: Vec<&'static dyn FloorBackend>,
    residues: Vec<&'static dyn ResidueBackend>,
    times: Vec<&'static dyn TimeBackend>,
    mappings: Vec<&'static dyn MappingBackend>,
}

impl BackendRegistry {
    /// 内建后端表: floor0 / residue0 / time0 / mapping0 各占类型码 0
    pub fn builtin() -> Self {
        Self {
            floors: vec![&FLOOR0],
            residues: vec![&RESIDUE0],
            times: vec![&TIME0],
            mappings: vec![&MAPPING0],
        }
    }

    pub fn floor_by_type(&self, code: u16) -> QinResult<&'static dyn FloorBackend> {
        self.floors.get(code as usize).copied().ok_or_else(|| {
            QinError::InvalidData(format!("未知的 floor 类型码: {}", code))
        })
    }

    pub fn residue_by_type(&self, code: u16) -> QinResult<&'static dyn ResidueBackend> {
        self.residues.get(code as usize).copied().ok_or_else(|| {
            QinError::InvalidData(format!("未知的 residue 类型码: {}", code))
        })
    }

    pub fn time_by_type(&self, code: u16) -> QinResult<&'static dyn TimeBackend> {
        self.times.get(code as usize).copied().ok_or_else(|| {
            QinError::InvalidData(format!("未知的 time 类型码: {}", code))
        })
    }

    pub fn mapping_by_type(&self, code: u16) -> QinResult<&'static dyn MappingBackend> {
        self.mappings.get(code as usize).copied().ok_or_else(|| {
            QinError::InvalidData(format!("未知的 mapping 类型码: {}", code))
        })
    }
}
