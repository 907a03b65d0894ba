//! time 后端 0: 空操作占位.
//!
//! 帧结构为后续的时域处理保留了挂接点, 后端 0 不携带任何参数,
//! 编解码两侧均不读写位流.

use std::any::Any;

use qin_core::{LsbBitReader, LsbBitWriter, QinResult};

use crate::backend::{TimeBackend, TimeLook, TimeParams};

/// time0 参数集 (空)
#[derive(Debug, Clone, Default)]
pub struct Time0Params;

impl TimeParams for Time0Params {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Time0Look;

impl TimeLook for Time0Look {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// time 后端 0 单例
pub struct Time0;

impl TimeBackend for Time0 {
    fn name(&self) -> &'static str {
        "time0"
    }

    fn pack(&self, _params: &dyn TimeParams, _bw: &mut LsbBitWriter) -> QinResult<()> {
        Ok(())
    }

    fn unpack(&self, _br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn TimeParams>> {
        Ok(Box::new(Time0Params))
    }

    fn make_look(&self, _params: &dyn TimeParams, _n2: usize) -> QinResult<Box<dyn TimeLook>> {
        Ok(Box::new(Time0Look))
    }

    fn forward(&self, _look: &dyn TimeLook, _bw: &mut LsbBitWriter) -> QinResult<()> {
        Ok(())
    }

    fn inverse(&self, _look: &dyn TimeLook, _br: &mut LsbBitReader<'_>) -> QinResult<()> {
        Ok(())
    }
}
