//! mapping 后端 0: 声道映射协调器.
//!
//! 一个编码块的唯一入口. 每个声道经 mux 表归属一个 submap, 每个
//! submap 绑定一组 time/floor/residue 参数集与一份心理声学参数.
//! 编码流程: 加窗 → MDCT 细谱 + 辅助粗谱 → 掩蔽曲线 → floor 编码
//! (得到量化回写的包络与 nonzero 标志) → 归一化残差 → 按 submap
//! 把 nonzero 声道组成 bundle 交给 residue. 解码严格逆序.
//!
//! mapping 头布局 (LSB-first):
//!
//! ```text
//! submaps-1(4)
//! 若 submaps > 1: 每声道 mux(4)
//! 每 submap: time(8) floor(8) residue(8)
//! ```
//!
//! submap 计数无论单复都写出, 头部布局不随取值改变.

use std::any::Any;

use qin_core::{LsbBitReader, LsbBitWriter, QinError, QinResult};

use crate::backend::{
    FloorBackend, FloorLook, MappingBackend, MappingLook, MappingParams, ResidueBackend,
    ResidueLook, SetupLimits, TimeBackend, TimeLook,
};
use crate::block::Block;
use crate::config::CodecConfig;
use crate::psy::{apply_floor, remove_floor, PsyLook};
use crate::registry::BackendRegistry;
use crate::transform::{Mdct, SpectralEstimator};
use crate::window::block_window;

/// submap 数量上限 (4 位计数)
const MAX_SUBMAPS: usize = 16;

/// mapping0 参数集
#[derive(Debug, Clone)]
pub struct Mapping0Params {
    /// submap 数量 (1..=16)
    pub submaps: usize,
    /// 每声道的 submap 归属
    pub mux: Vec<usize>,
    /// 每 submap 的 time 参数集索引
    pub time_submap: Vec<usize>,
    /// 每 submap 的 floor 参数集索引
    pub floor_submap: Vec<usize>,
    /// 每 submap 的 residue 参数集索引
    pub residue_submap: Vec<usize>,
    /// 每 submap 的心理声学参数索引 (仅编码端, 不序列化)
    pub psy_submap: Vec<usize>,
}

impl MappingParams for Mapping0Params {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 一个 submap 的全部子后端工作状态
struct SubmapLook {
    time: &'static dyn TimeBackend,
    time_look: Box<dyn TimeLook>,
    floor: &'static dyn FloorBackend,
    floor_look: Box<dyn FloorLook>,
    residue: &'static dyn ResidueBackend,
    residue_look: Box<dyn ResidueLook>,
    psy: PsyLook,
}

/// mapping0 的逐 mode 工作状态
struct Mapping0Look {
    params: Mapping0Params,
    /// 本 mode 的块长
    n: usize,
    /// 窗函数, 下标 = prev_flag << 1 | next_flag (短块四项相同)
    windows: [Vec<f32>; 4],
    mdct: Mdct,
    estimator: SpectralEstimator,
    submaps: Vec<SubmapLook>,
}

impl MappingLook for Mapping0Look {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Mapping0Look {
    fn window(&self, block: &Block) -> &[f32] {
        if block.block_flag {
            let idx = (usize::from(block.prev_flag) << 1) | usize::from(block.next_flag);
            &self.windows[idx]
        } else {
            &self.windows[3]
        }
    }
}

/// mapping 后端 0 单例
pub struct Mapping0;

impl Mapping0 {
    fn look<'a>(&self, look: &'a dyn MappingLook) -> QinResult<&'a Mapping0Look> {
        look.as_any()
            .downcast_ref::<Mapping0Look>()
            .ok_or_else(|| QinError::Internal("mapping0 look 类型不匹配".into()))
    }

    fn check_block(&self, l: &Mapping0Look, block: &Block) -> QinResult<()> {
        let channels = l.params.mux.len();
        if block.pcm.len() != channels || block.nonzero.len() != channels {
            return Err(QinError::InvalidArgument(format!(
                "块声道数 {} 与 mapping 声道数 {} 不符",
                block.pcm.len(),
                channels,
            )));
        }
        Ok(())
    }
}

impl MappingBackend for Mapping0 {
    fn name(&self) -> &'static str {
        "mapping0"
    }

    fn pack(
        &self,
        limits: &SetupLimits,
        params: &dyn MappingParams,
        bw: &mut LsbBitWriter,
    ) -> QinResult<()> {
        let p = params
            .as_any()
            .downcast_ref::<Mapping0Params>()
            .ok_or_else(|| QinError::Internal("mapping0 参数类型不匹配".into()))?;
        if p.submaps == 0
            || p.submaps > MAX_SUBMAPS
            || p.mux.len() != limits.channels
            || p.time_submap.len() < p.submaps
            || p.floor_submap.len() < p.submaps
            || p.residue_submap.len() < p.submaps
        {
            return Err(QinError::InvalidArgument(format!(
                "mapping0 参数结构非法: submaps={} mux={}",
                p.submaps,
                p.mux.len(),
            )));
        }
        bw.write_bits(p.submaps as u32 - 1, 4);
        if p.submaps > 1 {
            for &m in &p.mux {
                bw.write_bits(m as u32, 4);
            }
        }
        for s in 0..p.submaps {
            bw.write_bits(p.time_submap[s] as u32, 8);
            bw.write_bits(p.floor_submap[s] as u32, 8);
            bw.write_bits(p.residue_submap[s] as u32, 8);
        }
        Ok(())
    }

    fn unpack(
        &self,
        limits: &SetupLimits,
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<Box<dyn MappingParams>> {
        let submaps = br.read_bits(4)? as usize + 1;
        let mut mux = vec![0usize; limits.channels];
        if submaps > 1 {
            for m in mux.iter_mut() {
                let v = br.read_bits(4)? as usize;
                if v >= submaps {
                    return Err(QinError::InvalidData(format!(
                        "mapping0 mux 越界: {} (submaps={})",
                        v, submaps,
                    )));
                }
                *m = v;
            }
        }
        let mut time_submap = Vec::with_capacity(submaps);
        let mut floor_submap = Vec::with_capacity(submaps);
        let mut residue_submap = Vec::with_capacity(submaps);
        for s in 0..submaps {
            let t = br.read_bits(8)? as usize;
            let f = br.read_bits(8)? as usize;
            let r = br.read_bits(8)? as usize;
            if t >= limits.times || f >= limits.floors || r >= limits.residues {
                return Err(QinError::InvalidData(format!(
                    "mapping0 submap {} 参数集索引越界: time={} floor={} residue={}",
                    s, t, f, r,
                )));
            }
            time_submap.push(t);
            floor_submap.push(f);
            residue_submap.push(r);
        }
        Ok(Box::new(Mapping0Params {
            submaps,
            mux,
            time_submap,
            floor_submap,
            residue_submap,
            psy_submap: vec![0; submaps],
        }))
    }

    fn make_look(
        &self,
        config: &CodecConfig,
        registry: &BackendRegistry,
        mode_index: usize,
    ) -> QinResult<Box<dyn MappingLook>> {
        let mode = config.modes.get(mode_index).ok_or_else(|| {
            QinError::InvalidArgument(format!("mode 索引越界: {}", mode_index))
        })?;
        let setup = &config.mappings[mode.mapping];
        let p = setup
            .params
            .as_any()
            .downcast_ref::<Mapping0Params>()
            .ok_or_else(|| QinError::Internal("mapping0 参数类型不匹配".into()))?;
        if p.mux.len() != config.channels {
            return Err(QinError::InvalidData(format!(
                "mapping0 mux 长度 {} 与声道数 {} 不符",
                p.mux.len(),
                config.channels,
            )));
        }
        for &m in &p.mux {
            if m >= p.submaps {
                return Err(QinError::InvalidData(format!("mapping0 mux 越界: {}", m)));
            }
        }
        if p.time_submap.len() < p.submaps
            || p.floor_submap.len() < p.submaps
            || p.residue_submap.len() < p.submaps
            || p.psy_submap.len() < p.submaps
        {
            return Err(QinError::InvalidData(format!(
                "mapping0 submap 表长度不足: submaps={}",
                p.submaps,
            )));
        }

        let n = config.blocksizes[usize::from(mode.block_flag)];
        let n2 = n / 2;
        // 斜率长度 = 相邻块长的一半
        let short_slope = config.blocksizes[0] / 2;

        // 长块的窗斜率随邻块长短变化, 短块恒为全斜率
        let windows = if mode.block_flag {
            [
                block_window(n, short_slope, short_slope),
                block_window(n, short_slope, n2),
                block_window(n, n2, short_slope),
                block_window(n, n2, n2),
            ]
        } else {
            let w = block_window(n, n2, n2);
            [w.clone(), w.clone(), w.clone(), w]
        };

        let mut submaps = Vec::with_capacity(p.submaps);
        for s in 0..p.submaps {
            let time_setup = config.times.get(p.time_submap[s]).ok_or_else(|| {
                QinError::InvalidData(format!("submap {} time 索引越界", s))
            })?;
            let floor_setup = config.floors.get(p.floor_submap[s]).ok_or_else(|| {
                QinError::InvalidData(format!("submap {} floor 索引越界", s))
            })?;
            let residue_setup = config.residues.get(p.residue_submap[s]).ok_or_else(|| {
                QinError::InvalidData(format!("submap {} residue 索引越界", s))
            })?;
            let psy_params = config.psys.get(p.psy_submap[s]).ok_or_else(|| {
                QinError::InvalidData(format!("submap {} psy 索引越界", s))
            })?;

            let time = registry.time_by_type(time_setup.type_code)?;
            let floor = registry.floor_by_type(floor_setup.type_code)?;
            let residue = registry.residue_by_type(residue_setup.type_code)?;

            submaps.push(SubmapLook {
                time_look: time.make_look(time_setup.params.as_ref(), n2)?,
                time,
                floor_look: floor.make_look(floor_setup.params.as_ref(), n2)?,
                floor,
                residue_look: residue.make_look(residue_setup.params.as_ref(), n2)?,
                residue,
                psy: PsyLook::new(psy_params, n2, config.sample_rate),
            });
        }

        Ok(Box::new(Mapping0Look {
            params: p.clone(),
            n,
            windows,
            mdct: Mdct::new(n),
            estimator: SpectralEstimator::new(n),
            submaps,
        }))
    }

    fn forward(
        &self,
        look: &dyn MappingLook,
        block: &mut Block,
        bw: &mut LsbBitWriter,
    ) -> QinResult<()> {
        let l = self.look(look)?;
        self.check_block(l, block)?;
        let channels = l.params.mux.len();
        let n2 = l.n / 2;
        let window = l.window(block);

        // 加窗 + 双路变换, 每声道得到细谱与粗谱估计
        let mut fine: Vec<Vec<f32>> = Vec::with_capacity(channels);
        let mut coarse: Vec<Vec<f32>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let pcm = &block.pcm[ch];
            if pcm.len() != l.n {
                return Err(QinError::InvalidArgument(format!(
                    "声道 {} 样本数 {} 与块长 {} 不符",
                    ch,
                    pcm.len(),
                    l.n,
                )));
            }
            let windowed: Vec<f32> = pcm.iter().zip(window).map(|(&x, &w)| x * w).collect();
            fine.push(l.mdct.forward(&windowed));
            coarse.push(l.estimator.magnitudes(&windowed));
        }

        // time 钩子 (submap 顺序)
        for sub in &l.submaps {
            sub.time.forward(sub.time_look.as_ref(), bw)?;
        }

        // 掩蔽 → floor 编码 → 归一化残差, 声道顺序
        let mut peak_db = block.peak_db;
        let mut curve = vec![0.0f32; n2];
        for ch in 0..channels {
            let sub = &l.submaps[l.params.mux[ch]];
            let ch_peak = sub
                .psy
                .compute_mask(&fine[ch], &coarse[ch], &mut curve, block.peak_db);
            peak_db = peak_db.max(ch_peak);
            let nonzero = sub
                .floor
                .forward(sub.floor_look.as_ref(), &mut curve, bw)?;
            block.nonzero[ch] = nonzero;
            if nonzero {
                // curve 此时是量化回写后的包络, 与解码端按位一致
                apply_floor(&mut fine[ch], &curve);
            } else {
                fine[ch].fill(0.0);
            }
        }
        block.peak_db = peak_db;

        // residue 编码, submap 顺序, bundle 只收 nonzero 声道
        for (s, sub) in l.submaps.iter().enumerate() {
            let bundle: Vec<usize> = (0..channels)
                .filter(|&ch| l.params.mux[ch] == s && block.nonzero[ch])
                .collect();
            sub.residue
                .forward(sub.residue_look.as_ref(), &fine, &bundle, bw)?;
        }
        Ok(())
    }

    fn inverse(
        &self,
        look: &dyn MappingLook,
        block: &mut Block,
        br: &mut LsbBitReader<'_>,
    ) -> QinResult<()> {
        let l = self.look(look)?;
        self.check_block(l, block)?;
        let channels = l.params.mux.len();
        let n2 = l.n / 2;
        let window = l.window(block);

        for sub in &l.submaps {
            sub.time.inverse(sub.time_look.as_ref(), br)?;
        }

        // floor 解码, 声道顺序
        let mut curves: Vec<Vec<f32>> = vec![vec![0.0f32; n2]; channels];
        for ch in 0..channels {
            let sub = &l.submaps[l.params.mux[ch]];
            block.nonzero[ch] = sub
                .floor
                .inverse(sub.floor_look.as_ref(), &mut curves[ch], br)?;
        }

        // residue 解码, submap 顺序
        let mut residual: Vec<Vec<f32>> = vec![vec![0.0f32; n2]; channels];
        for (s, sub) in l.submaps.iter().enumerate() {
            let bundle: Vec<usize> = (0..channels)
                .filter(|&ch| l.params.mux[ch] == s && block.nonzero[ch])
                .collect();
            sub.residue
                .inverse(sub.residue_look.as_ref(), &mut residual, &bundle, br)?;
        }

        // 恢复谱 → 逆变换 → 加窗, 静音声道直接输出零
        let mut spectrum = vec![0.0f32; n2];
        for ch in 0..channels {
            if block.nonzero[ch] {
                remove_floor(&residual[ch], &curves[ch], &mut spectrum);
                let mut pcm = l.mdct.inverse(&spectrum);
                for (x, &w) in pcm.iter_mut().zip(window) {
                    *x *= w;
                }
                block.pcm[ch] = pcm;
            } else {
                block.pcm[ch] = vec![0.0f32; l.n];
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SetupLimits;

    fn limits() -> SetupLimits {
        SetupLimits {
            channels: 2,
            times: 1,
            floors: 2,
            residues: 2,
        }
    }

    fn two_submap_params() -> Mapping0Params {
        Mapping0Params {
            submaps: 2,
            mux: vec![0, 1],
            time_submap: vec![0, 0],
            floor_submap: vec![0, 1],
            residue_submap: vec![1, 0],
            psy_submap: vec![0, 0],
        }
    }

    #[test]
    fn test_mapping头往返() {
        let p = two_submap_params();
        let mut bw = LsbBitWriter::new();
        Mapping0.pack(&limits(), &p, &mut bw).unwrap();
        let data = bw.finish();
        let back = Mapping0
            .unpack(&limits(), &mut LsbBitReader::new(&data))
            .unwrap();
        let b = back.as_any().downcast_ref::<Mapping0Params>().unwrap();
        assert_eq!(b.submaps, 2);
        assert_eq!(b.mux, vec![0, 1]);
        assert_eq!(b.floor_submap, vec![0, 1]);
        assert_eq!(b.residue_submap, vec![1, 0]);
        // 心理声学索引不进线上格式, 解出为默认值
        assert_eq!(b.psy_submap, vec![0, 0]);
    }

    #[test]
    fn test_单submap仍写计数但省略mux() {
        let p = Mapping0Params {
            submaps: 1,
            mux: vec![0, 0],
            time_submap: vec![0],
            floor_submap: vec![0],
            residue_submap: vec![0],
            psy_submap: vec![0],
        };
        let mut bw = LsbBitWriter::new();
        Mapping0.pack(&limits(), &p, &mut bw).unwrap();
        // submaps-1(4) + time/floor/residue(24), 无 mux 字段
        assert_eq!(bw.bits_written(), 4 + 24);
        let data = bw.finish();
        let back = Mapping0
            .unpack(&limits(), &mut LsbBitReader::new(&data))
            .unwrap();
        let b = back.as_any().downcast_ref::<Mapping0Params>().unwrap();
        assert_eq!(b.submaps, 1);
        assert_eq!(b.mux, vec![0, 0]);
    }

    #[test]
    fn test_越界索引被拒绝() {
        // floor 索引超出声明数量
        let mut p = two_submap_params();
        p.floor_submap[1] = 9;
        let mut bw = LsbBitWriter::new();
        Mapping0.pack(&limits(), &p, &mut bw).unwrap();
        let data = bw.finish();
        assert!(Mapping0
            .unpack(&limits(), &mut LsbBitReader::new(&data))
            .is_err());

        // mux 指向不存在的 submap
        let mut bw = LsbBitWriter::new();
        bw.write_bits(1, 4); // submaps = 2
        bw.write_bits(5, 4); // mux[0] = 5, 越界
        bw.write_bits(0, 4);
        for _ in 0..2 {
            bw.write_bits(0, 8);
            bw.write_bits(0, 8);
            bw.write_bits(0, 8);
        }
        let data = bw.finish();
        assert!(Mapping0
            .unpack(&limits(), &mut LsbBitReader::new(&data))
            .is_err());
    }
}
