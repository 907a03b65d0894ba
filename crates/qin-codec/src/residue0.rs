//! residue 后端 0: 分区标量量化.
//!
//! 对 floor 归一化后的残差谱在 [begin, end) 区间按 `partition_size`
//! 分区. 每个分区内, bundle 中各声道交织: 先写该声道该分区的 4 位
//! 尺度指数, 再写定宽有符号量化值. 分区为外层循环、声道为内层循环,
//! 相关声道的数据因此在位流中相邻 (交织编码).
//!
//! 尺度指数 e 对应步长 2^(e-8); 编码端为每 (声道, 分区) 选取能容纳
//! 分区最大幅度的最小指数. bundle 为空时不产生任何输出.

use std::any::Any;

use qin_core::{LsbBitReader, LsbBitWriter, QinError, QinResult};

use crate::backend::{ResidueBackend, ResidueLook, ResidueParams};

/// 尺度指数的偏置: 步长 = 2^(e - SCALE_BIAS)
const SCALE_BIAS: i32 = 8;
const SCALE_BITS: u32 = 4;

/// residue0 参数集
#[derive(Debug, Clone)]
pub struct Residue0Params {
    /// 编码区间起点 (bin)
    pub begin: u32,
    /// 编码区间终点 (bin, 不含)
    pub end: u32,
    /// 分区长度 (bin)
    pub partition_size: u32,
    /// 每个残差值的位宽 (2..=16)
    pub value_bits: u32,
}

impl ResidueParams for Residue0Params {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// residue0 工作状态
struct Residue0Look {
    params: Residue0Params,
    /// 区间起止, 已收窄到当前半谱长
    begin: usize,
    end: usize,
}

impl ResidueLook for Residue0Look {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// residue 后端 0 单例
pub struct Residue0;

impl Residue0 {
    fn look<'a>(&self, look: &'a dyn ResidueLook) -> QinResult<&'a Residue0Look> {
        look.as_any()
            .downcast_ref::<Residue0Look>()
            .ok_or_else(|| QinError::Internal("residue0 look 类型不匹配".into()))
    }

    fn step(exp: u32) -> f32 {
        (2.0f32).powi(exp as i32 - SCALE_BIAS)
    }

    /// 为分区选取最小的能容纳 `max_abs` 的尺度指数
    fn pick_exponent(max_abs: f32, qmax: i32) -> u32 {
        for e in 0..(1u32 << SCALE_BITS) {
            if max_abs <= Self::step(e) * qmax as f32 {
                return e;
            }
        }
        (1u32 << SCALE_BITS) - 1
    }
}

impl ResidueBackend for Residue0 {
    fn name(&self) -> &'static str {
        "residue0"
    }

    fn pack(&self, params: &dyn ResidueParams, bw: &mut LsbBitWriter) -> QinResult<()> {
        let p = params
            .as_any()
            .downcast_ref::<Residue0Params>()
            .ok_or_else(|| QinError::Internal("residue0 参数类型不匹配".into()))?;
        bw.write_bits(p.begin, 24);
        bw.write_bits(p.end, 24);
        bw.write_bits(p.partition_size - 1, 24);
        bw.write_bits(p.value_bits - 1, 4);
        Ok(())
    }

    fn unpack(&self, br: &mut LsbBitReader<'_>) -> QinResult<Box<dyn ResidueParams>> {
        let begin = br.read_bits(24)?;
        let end = br.read_bits(24)?;
        let partition_size = br.read_bits(24)? + 1;
        let value_bits = br.read_bits(4)? + 1;
        if end < begin {
            return Err(QinError::InvalidData(format!(
                "residue0 区间非法: [{}, {})",
                begin, end,
            )));
        }
        if value_bits < 2 {
            return Err(QinError::InvalidData(format!(
                "residue0 value_bits 非法: {}",
                value_bits,
            )));
        }
        Ok(Box::new(Residue0Params {
            begin,
            end,
            partition_size,
            value_bits,
        }))
    }

    fn make_look(
        &self,
        params: &dyn ResidueParams,
        n2: usize,
    ) -> QinResult<Box<dyn ResidueLook>> {
        let p = params
            .as_any()
            .downcast_ref::<Residue0Params>()
            .ok_or_else(|| QinError::Internal("residue0 参数类型不匹配".into()))?;
        Ok(Box::new(Residue0Look {
            params: p.clone(),
            begin: (p.begin as usize).min(n2),
            end: (p.end as usize).min(n2),
        }))
    }

    fn forward(
        &self,
        look: &dyn ResidueLook,
        channels: &[Vec<f32>],
        bundle: &[usize],
        bw: &mut LsbBitWriter,
    ) -> QinResult<()> {
        let l = self.look(look)?;
        if bundle.is_empty() || l.end <= l.begin {
            return Ok(());
        }
        let psize = l.params.partition_size as usize;
        let vbits = l.params.value_bits;
        let qmax = (1i32 << (vbits - 1)) - 1;

        let mut lo = l.begin;
        while lo < l.end {
            let hi = (lo + psize).min(l.end);
            for &ch in bundle {
                let seg = channels
                    .get(ch)
                    .and_then(|c| c.get(lo..hi))
                    .ok_or_else(|| {
                        QinError::Internal(format!("residue0 bundle 声道 {} 越界", ch))
                    })?;
                let max_abs = seg.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
                let exp = Self::pick_exponent(max_abs, qmax);
                let step = Self::step(exp);
                bw.write_bits(exp, SCALE_BITS);
                for &v in seg {
                    let q = (v / step).round().clamp(-qmax as f32, qmax as f32) as i32;
                    bw.write_bits((q + qmax) as u32, vbits);
                }
            }
            lo = hi;
        }
        Ok(())
    }

    fn inverse(
        &self,
        look: &dyn ResidueLook,
        channels: &mut [Vec<f32>],
        bundle: &[usize],
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<()> {
        let l = self.look(look)?;
        if bundle.is_empty() || l.end <= l.begin {
            return Ok(());
        }
        let psize = l.params.partition_size as usize;
        let vbits = l.params.value_bits;
        let qmax = (1i32 << (vbits - 1)) - 1;

        let mut lo = l.begin;
        while lo < l.end {
            let hi = (lo + psize).min(l.end);
            for &ch in bundle {
                let exp = br.read_bits(SCALE_BITS)?;
                let step = Self::step(exp);
                let seg = channels
                    .get_mut(ch)
                    .and_then(|c| c.get_mut(lo..hi))
                    .ok_or_else(|| {
                        QinError::InvalidData(format!("residue0 bundle 声道 {} 越界", ch))
                    })?;
                for slot in seg {
                    let q = br.read_bits(vbits)? as i32 - qmax;
                    *slot = q as f32 * step;
                }
            }
            lo = hi;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_look(n2: usize) -> Box<dyn ResidueLook> {
        Residue0
            .make_look(
                &Residue0Params {
                    begin: 0,
                    end: n2 as u32,
                    partition_size: 16,
                    value_bits: 8,
                },
                n2,
            )
            .unwrap()
    }

    #[test]
    fn test_参数往返与范围校验() {
        let p = Residue0Params {
            begin: 4,
            end: 100,
            partition_size: 8,
            value_bits: 10,
        };
        let mut bw = LsbBitWriter::new();
        Residue0.pack(&p, &mut bw).unwrap();
        let data = bw.finish();
        let back = Residue0.unpack(&mut LsbBitReader::new(&data)).unwrap();
        let b = back.as_any().downcast_ref::<Residue0Params>().unwrap();
        assert_eq!((b.begin, b.end, b.partition_size, b.value_bits), (4, 100, 8, 10));

        // end < begin 必须被拒绝
        let bad = Residue0Params {
            begin: 100,
            end: 4,
            partition_size: 8,
            value_bits: 10,
        };
        let mut bw = LsbBitWriter::new();
        Residue0.pack(&bad, &mut bw).unwrap();
        let data = bw.finish();
        assert!(Residue0.unpack(&mut LsbBitReader::new(&data)).is_err());
    }

    #[test]
    fn test_残差往返误差受步长约束() {
        let n2 = 64;
        let look = make_look(n2);
        let mut channels = vec![
            (0..n2).map(|i| ((i * 7 % 13) as f32 - 6.0) * 0.8).collect::<Vec<f32>>(),
            (0..n2).map(|i| ((i * 5 % 11) as f32 - 5.0) * 1.7).collect::<Vec<f32>>(),
        ];
        let original = channels.clone();
        let bundle = [0usize, 1];

        let mut bw = LsbBitWriter::new();
        Residue0
            .forward(look.as_ref(), &channels, &bundle, &mut bw)
            .unwrap();
        let data = bw.finish();

        for c in channels.iter_mut() {
            c.fill(0.0);
        }
        let mut br = LsbBitReader::new(&data);
        Residue0
            .inverse(look.as_ref(), &mut channels, &bundle, &mut br)
            .unwrap();
        assert!(br.is_eof() || br.bits_left() < 8);

        for ch in 0..2 {
            let max_abs = original[ch]
                .iter()
                .fold(0.0f32, |m, &v| m.max(v.abs()));
            // 误差上界: 半个步长, 步长由分区最大幅度决定
            let bound = max_abs / 127.0 * 0.5 + 1e-4;
            for i in 0..n2 {
                assert!(
                    (channels[ch][i] - original[ch][i]).abs() <= bound * 2.0,
                    "ch {} bin {} 误差过大",
                    ch,
                    i,
                );
            }
        }
    }

    #[test]
    fn test_空bundle为无操作() {
        let look = make_look(64);
        let channels = vec![vec![1.0f32; 64]];
        let mut bw = LsbBitWriter::new();
        Residue0
            .forward(look.as_ref(), &channels, &[], &mut bw)
            .unwrap();
        assert_eq!(bw.bits_written(), 0);

        let mut channels = vec![vec![0.0f32; 64]];
        let mut br = LsbBitReader::new(&[]);
        Residue0
            .inverse(look.as_ref(), &mut channels, &[], &mut br)
            .unwrap();
        assert_eq!(br.bit_position(), 0);
    }

    #[test]
    fn test_声道交织顺序() {
        // 两声道常数谱: 位流应为 分区0(ch0, ch1) 分区1(ch0, ch1) ...
        let n2 = 32;
        let look = make_look(n2);
        let channels = vec![vec![1.0f32; n2], vec![-1.0f32; n2]];
        let bundle = [0usize, 1];
        let mut bw = LsbBitWriter::new();
        Residue0
            .forward(look.as_ref(), &channels, &bundle, &mut bw)
            .unwrap();
        let data = bw.finish();

        // 每分区每声道: 4 位指数 + 16 × 8 位值; 两个分区共 2×2 组
        let group_bits = 4 + 16 * 8;
        assert_eq!(data.len() * 8, 2 * 2 * group_bits);

        let mut br = LsbBitReader::new(&data);
        // 第一组属于 ch0: 值应解出 +1
        let exp = br.read_bits(4).unwrap();
        let step = Residue0::step(exp);
        let q = br.read_bits(8).unwrap() as i32 - 127;
        assert!((q as f32 * step - 1.0).abs() < step);
        // 跳过 ch0 其余值, 下一组属于 ch1: 值应解出 -1
        br.skip_bits(15 * 8).unwrap();
        let exp = br.read_bits(4).unwrap();
        let step = Residue0::step(exp);
        let q = br.read_bits(8).unwrap() as i32 - 127;
        assert!((q as f32 * step + 1.0).abs() < step);
    }
}
