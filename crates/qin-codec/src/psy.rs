//! 心理声学模型: 由频谱能量计算掩蔽/噪声基底曲线.
//!
//! 输入两份估计: MDCT 细谱 (相位敏感) 与辅助 DFT 粗谱 (模值, 音调
//! 定位更稳), 逐 bin 取最大后在 Bark 域做双向峰值扩散, 再与噪声
//! 基底、可选的绝对听阈取最大, 得到每 bin 的掩蔽曲线.
//!
//! 扩散斜率与各偏移量是经验调优值, 不属于线上格式的一部分;
//! 模型参数也不序列化进 setup 头 (解码端不需要掩蔽曲线).
//!
//! 跨块携带的运行峰值显式地从调用方传入并由返回值带出, 模型本身
//! 不保存任何随块演化的状态.

use crate::scales::{ath_db, from_db, to_bark, to_db, SILENCE_DB};

/// 心理声学模型参数 (每个参数集一份, 由 submap 选择)
#[derive(Debug, Clone)]
pub struct PsyParams {
    /// Bark 域峰值扩散斜率 (dB / Bark)
    pub spread_db_per_bark: f32,
    /// 掩蔽曲线相对扩散峰的整体下压 (dB, 负值)
    pub mask_offset_db: f32,
    /// 绝对动态范围下限 (dB, 负值); 曲线不会低于此值
    pub abs_floor_db: f32,
    /// 是否叠加绝对听阈
    pub use_ath: bool,
}

impl Default for PsyParams {
    fn default() -> Self {
        Self {
            spread_db_per_bark: 24.0,
            mask_offset_db: -16.0,
            abs_floor_db: -140.0,
            use_ath: false,
        }
    }
}

/// 心理声学模型工作状态 (每 (mode, submap) 一份, 流生命周期内只读)
pub struct PsyLook {
    params: PsyParams,
    /// 相邻 bin 的 Bark 间距 (长度 n2 - 1)
    bark_step: Vec<f32>,
    /// 每 bin 的绝对听阈 (dB), 未启用时为空
    ath: Vec<f32>,
    n2: usize,
}

impl PsyLook {
    /// 为半谱长 `n2`、采样率 `sample_rate` 构建模型状态
    pub fn new(params: &PsyParams, n2: usize, sample_rate: u32) -> Self {
        let bin_hz = sample_rate as f32 * 0.5 / n2 as f32;
        let bark: Vec<f32> = (0..n2)
            .map(|i| to_bark((i as f32 + 0.5) * bin_hz))
            .collect();
        let bark_step = bark.windows(2).map(|w| w[1] - w[0]).collect();
        let ath = if params.use_ath {
            (0..n2).map(|i| ath_db((i as f32 + 0.5) * bin_hz)).collect()
        } else {
            Vec::new()
        };
        Self {
            params: params.clone(),
            bark_step,
            ath,
            n2,
        }
    }

    /// 计算掩蔽曲线并推进运行峰值
    ///
    /// `fine` 为 MDCT 细谱, `coarse` 为辅助估计器的粗谱模值, 两者
    /// 长度均为 n2. 曲线以线性幅度写入 `curve`. 返回新的运行峰值
    /// (dB), 由调用方携带到下一块.
    pub fn compute_mask(
        &self,
        fine: &[f32],
        coarse: &[f32],
        curve: &mut [f32],
        prior_peak_db: f32,
    ) -> f32 {
        assert_eq!(fine.len(), self.n2, "细谱长度与模型不符");
        assert_eq!(coarse.len(), self.n2, "粗谱长度与模型不符");
        assert_eq!(curve.len(), self.n2, "输出曲线长度与模型不符");

        let p = &self.params;

        // 两个估计逐 bin 取最大作为种子 (dB 域)
        let mut seed: Vec<f32> = fine
            .iter()
            .zip(coarse)
            .map(|(&f, &c)| to_db(f).max(to_db(c)))
            .collect();

        let mut new_peak = prior_peak_db;
        for &s in &seed {
            if s > new_peak {
                new_peak = s;
            }
        }

        // Bark 域双向峰值扩散: 一阶衰减包络
        let mut carry = SILENCE_DB;
        for i in 0..self.n2 {
            if i > 0 {
                carry -= p.spread_db_per_bark * self.bark_step[i - 1];
            }
            carry = carry.max(seed[i]);
            seed[i] = carry;
        }
        carry = SILENCE_DB;
        for i in (0..self.n2).rev() {
            if i + 1 < self.n2 {
                carry -= p.spread_db_per_bark * self.bark_step[i];
            }
            carry = carry.max(seed[i]);
            seed[i] = carry;
        }

        // 下压得到掩蔽曲线, 与绝对下限/听阈取最大
        for (i, out) in curve.iter_mut().enumerate() {
            let mut db = seed[i] + p.mask_offset_db;
            db = db.max(p.abs_floor_db);
            if !self.ath.is_empty() {
                db = db.max(self.ath[i]);
            }
            *out = from_db(db.min(0.0));
        }

        new_peak
    }
}

/// 应用 floor: 谱除以曲线得到归一化残差, 低于曲线的 bin 视为
/// 感知无关并清零
///
/// 编码端必须传入 floor 后端量化回写后的曲线 (而非模型原始输出),
/// 以保证与解码端按位一致.
pub fn apply_floor(spectrum: &mut [f32], curve: &[f32]) {
    debug_assert_eq!(spectrum.len(), curve.len());
    for (s, &c) in spectrum.iter_mut().zip(curve) {
        if c <= 0.0 || s.abs() < c {
            *s = 0.0;
        } else {
            *s /= c;
        }
    }
}

/// 逆向应用 floor: 残差乘回包络, 恢复谱
pub fn remove_floor(residual: &[f32], curve: &[f32], spectrum: &mut [f32]) {
    debug_assert_eq!(residual.len(), curve.len());
    debug_assert_eq!(residual.len(), spectrum.len());
    for ((out, &r), &c) in spectrum.iter_mut().zip(residual).zip(curve) {
        *out = r * c;
    }
}
