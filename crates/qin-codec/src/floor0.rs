//! floor 后端 0: 分段线性 dB 包络.
//!
//! 在按对数间隔选取的 `posts` 个谱位置上采样掩蔽曲线, 幅度量化到
//! `amp_bits` 位 (dB 域等距, 范围 [-140, 0]), 段间在 dB 域线性插值.
//!
//! 逐块位流: nonzero(1); 若 nonzero, 继之 posts × amp_bits 个量化值.
//! 全部量化值为 0 时判定该声道静音 (nonzero = false), 不写幅度值;
//! 解码端仅凭这一位即可复现编码端的 bundle 成员判定.
//!
//! forward 会把输入曲线原地替换为反量化后的重建曲线, 保证编码端
//! 应用 floor 时使用与解码端按位一致的包络.

use std::any::Any;

use qin_core::{LsbBitReader, LsbBitWriter, QinError, QinResult};

use crate::backend::{FloorBackend, FloorLook, FloorParams};
use crate::scales::{from_db, to_db};

/// 量化 dB 范围: [-AMP_RANGE_DB, 0]
const AMP_RANGE_DB: f32 = 140.0;

/// floor0 参数集
#[derive(Debug, Clone)]
pub struct Floor0Params {
    /// 包络采样点数 (2..=64)
    pub posts: usize,
    /// 每点幅度位宽 (1..=8)
    pub amp_bits: u32,
}

impl FloorParams for Floor0Params {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// floor0 工作状态: 预计算的采样点谱位置
struct Floor0Look {
    params: Floor0Params,
    /// 严格递增的谱位置, positions[0] = 0, 末项 = n2 - 1
    positions: Vec<usize>,
}

impl FloorLook for Floor0Look {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// floor 后端 0 单例
pub struct Floor0;

impl Floor0 {
    fn look<'a>(&self, look: &'a dyn FloorLook) -> QinResult<&'a Floor0Look> {
        look.as_any()
            .downcast_ref::<Floor0Look>()
            .ok_or_else(|| QinError::Internal("floor0 look 类型不匹配".into()))
    }

    /// 量化一个 dB 值到 [0, levels-1]
    fn quantize(&self, db: f32, levels: u32) -> u32 {
        let t = ((db + AMP_RANGE_DB) / AMP_RANGE_DB).clamp(0.0, 1.0);
        (t * (levels - 1) as f32).round() as u32
    }

    /// 反量化回 dB
    fn dequantize(&self, q: u32, levels: u32) -> f32 {
        q as f32 / (levels - 1) as f32 * AMP_RANGE_DB - AMP_RANGE_DB
    }

    /// 由量化值重建整条曲线 (编解码共用, 保证按位一致)
    fn render(&self, look: &Floor0Look, quantized: &[u32], out: &mut [f32]) {
        let levels = 1u32 << look.params.amp_bits;
        for seg in 0..look.positions.len() - 1 {
            let x0 = look.positions[seg];
            let x1 = look.positions[seg + 1];
            let db0 = self.dequantize(quantized[seg], levels);
            let db1 = self.dequantize(quantized[seg + 1], levels);
            for (x, slot) in out.iter_mut().enumerate().take(x1 + 1).skip(x0) {
                let t = (x - x0) as f32 / (x1 - x0) as f32;
                *slot = from_db(db0 + (db1 - db0) * t);
            }
        }
    }
}

impl FloorBackend for Floor0 {
    fn name(&self) -> &'static str {
        "floor0"
    }

    fn pack(&self, params: &dyn FloorParams, bw: &mut LsbBitWriter) -> QinResult<()> {
        let p = params
            .as_any()
            .downcast_ref::<Floor0Params>()
            .ok_or_else(|| QinError::Internal("floor0 参数类型不匹配".into()))?;
        bw.write_bits(p.posts as u32 - 1, 6);
        bw.write_bits(p.amp_bits - 1, 3);
        Ok(())
    }

    fn unpack(&self, br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn FloorParams>> {
        let posts = br.read_bits(6)? as usize + 1;
        let amp_bits = br.read_bits(3)? + 1;
        if posts < 2 {
            return Err(QinError::InvalidData(format!(
                "floor0 posts 非法: {}",
                posts,
            )));
        }
        Ok(Box::new(Floor0Params { posts, amp_bits }))
    }

    fn make_look(&self, params: &dyn FloorParams, n2: usize) -> QinResult<Box<dyn FloorLook>> {
        let p = params
            .as_any()
            .downcast_ref::<Floor0Params>()
            .ok_or_else(|| QinError::Internal("floor0 参数类型不匹配".into()))?;
        if p.posts > n2 {
            return Err(QinError::InvalidData(format!(
                "floor0 posts {} 超过半谱长 {}",
                p.posts, n2,
            )));
        }

        // 对数间隔的谱位置, 前向生成后在两端锚定并保证严格递增
        let mut positions = vec![0usize; p.posts];
        for (i, slot) in positions.iter_mut().enumerate() {
            let f = i as f32 / (p.posts - 1) as f32;
            *slot = ((n2 as f32).powf(f).round() as usize).saturating_sub(1);
        }
        positions[0] = 0;
        let last = p.posts - 1;
        positions[last] = n2 - 1;
        for i in 1..p.posts {
            if positions[i] <= positions[i - 1] {
                positions[i] = positions[i - 1] + 1;
            }
        }
        for i in (0..last).rev() {
            if positions[i] >= positions[i + 1] {
                positions[i] = positions[i + 1] - 1;
            }
        }

        Ok(Box::new(Floor0Look {
            params: p.clone(),
            positions,
        }))
    }

    fn forward(
        &self,
        look: &dyn FloorLook,
        curve: &mut [f32],
        bw: &mut LsbBitWriter,
    ) -> QinResult<bool> {
        let l = self.look(look)?;
        debug_assert_eq!(curve.len() - 1, *l.positions.last().unwrap());
        let levels = 1u32 << l.params.amp_bits;

        let quantized: Vec<u32> = l
            .positions
            .iter()
            .map(|&x| self.quantize(to_db(curve[x]), levels))
            .collect();

        let nonzero = quantized.iter().any(|&q| q > 0);
        bw.write_flag(nonzero);
        if !nonzero {
            curve.fill(0.0);
            return Ok(false);
        }

        for &q in &quantized {
            bw.write_bits(q, l.params.amp_bits);
        }
        self.render(l, &quantized, curve);
        Ok(true)
    }

    fn inverse(
        &self,
        look: &dyn FloorLook,
        out: &mut [f32],
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<bool> {
        let l = self.look(look)?;
        debug_assert_eq!(out.len() - 1, *l.positions.last().unwrap());

        if !br.read_flag()? {
            out.fill(0.0);
            return Ok(false);
        }

        let mut quantized = Vec::with_capacity(l.params.posts);
        for _ in 0..l.params.posts {
            quantized.push(br.read_bits(l.params.amp_bits)?);
        }
        self.render(l, &quantized, out);
        Ok(true)
    }
}
