//! 变换引擎: 正/逆 MDCT 与辅助短时频谱估计器.
//!
//! MDCT 取块长 n 的加窗时域样本, 产生 n/2 个实系数; 逆变换恢复
//! n 个时域样本, 由协调器再次加窗并交给外层的重叠累加器完成重建.
//!
//! 归一化约定: 正变换带 4/n 因子, 使满刻度正弦的谱峰幅度约为其
//! 时域幅度 (便于 dB 域心理声学处理); 逆变换不再缩放, 两次加窗加
//! 50% 重叠累加后即完全重建.
//!
//! 辅助估计器对加窗样本做实 DFT 取模, 仅供心理声学模型做音调定位,
//! 不参与重建, 解码路径完全不使用.

use std::f32::consts::PI;

/// 正/逆 MDCT
///
/// 逐块无状态; 同一实例可被同一流内的所有声道复用.
pub struct Mdct {
    n: usize,
}

impl Mdct {
    /// 创建块长为 `n` (2 的幂) 的变换
    pub fn new(n: usize) -> Self {
        assert!(n.is_power_of_two() && n >= 16, "MDCT 块长非法: {}", n);
        Self { n }
    }

    /// 块长
    pub fn block_size(&self) -> usize {
        self.n
    }

    /// 正变换: n 个加窗时域样本 -> n/2 个频谱系数
    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        assert_eq!(input.len(), self.n, "MDCT 输入长度与块长不符");
        let n = self.n;
        let n2 = n / 2;
        let scale = 4.0 / n as f32;
        let base = PI / n2 as f32;
        let offset = 0.5 + n2 as f32 / 2.0;

        let mut out = vec![0.0f32; n2];
        for (k, coeff) in out.iter_mut().enumerate() {
            let kk = k as f32 + 0.5;
            let mut acc = 0.0f32;
            for (j, &x) in input.iter().enumerate() {
                acc += x * (base * (j as f32 + offset) * kk).cos();
            }
            *coeff = acc * scale;
        }
        out
    }

    /// 逆变换: n/2 个频谱系数 -> n 个时域样本 (未加窗)
    pub fn inverse(&self, spectrum: &[f32]) -> Vec<f32> {
        let n = self.n;
        let n2 = n / 2;
        assert_eq!(spectrum.len(), n2, "MDCT 谱长度与块长不符");
        let base = PI / n2 as f32;
        let offset = 0.5 + n2 as f32 / 2.0;

        let mut out = vec![0.0f32; n];
        for (j, sample) in out.iter_mut().enumerate() {
            let jj = j as f32 + offset;
            let mut acc = 0.0f32;
            for (k, &c) in spectrum.iter().enumerate() {
                acc += c * (base * jj * (k as f32 + 0.5)).cos();
            }
            *sample = acc;
        }
        out
    }
}

/// 辅助短时频谱估计器 (实 DFT 取模)
///
/// 与 MDCT 相同的 4/n 幅度约定, 输出 n/2 个非负模值.
pub struct SpectralEstimator {
    n: usize,
}

impl SpectralEstimator {
    /// 创建块长为 `n` 的估计器
    pub fn new(n: usize) -> Self {
        assert!(n.is_power_of_two() && n >= 16, "估计器块长非法: {}", n);
        Self { n }
    }

    /// 计算加窗样本的粗频谱模值
    pub fn magnitudes(&self, input: &[f32]) -> Vec<f32> {
        assert_eq!(input.len(), self.n, "估计器输入长度与块长不符");
        let n = self.n;
        let n2 = n / 2;
        let scale = 4.0 / n as f32;

        let mut out = vec![0.0f32; n2];
        for (k, mag) in out.iter_mut().enumerate() {
            let w = 2.0 * PI * k as f32 / n as f32;
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (j, &x) in input.iter().enumerate() {
                let phase = w * j as f32;
                re += x * phase.cos();
                im -= x * phase.sin();
            }
            *mag = scale * (re * re + im * im).sqrt();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::block_window;

    /// 加窗 → MDCT → IMDCT → 加窗, 对连续块做 50% 重叠累加
    fn analyze_synthesize(signal: &[f32], n: usize) -> Vec<f32> {
        let mdct = Mdct::new(n);
        let w = block_window(n, n / 2, n / 2);
        let hop = n / 2;
        let blocks = (signal.len() - n) / hop + 1;

        let mut out = vec![0.0f32; signal.len()];
        for b in 0..blocks {
            let off = b * hop;
            let windowed: Vec<f32> = signal[off..off + n]
                .iter()
                .zip(&w)
                .map(|(x, wv)| x * wv)
                .collect();
            let spec = mdct.forward(&windowed);
            let time = mdct.inverse(&spec);
            for (i, &t) in time.iter().enumerate() {
                out[off + i] += t * w[i];
            }
        }
        out
    }

    #[test]
    fn test_mdct_重叠累加完全重建() {
        let n = 64;
        let total = n * 6;
        let signal: Vec<f32> = (0..total)
            .map(|i| {
                let t = i as f32;
                (0.07 * t).sin() * 0.6 + (0.31 * t + 1.3).cos() * 0.25
            })
            .collect();

        let out = analyze_synthesize(&signal, n);
        // 首尾各半块没有完整的重叠伙伴, 跳过
        for i in n / 2..total - n / 2 {
            assert!(
                (out[i] - signal[i]).abs() < 1e-3,
                "i={} 重建误差过大: {} vs {}",
                i,
                out[i],
                signal[i]
            );
        }
    }

    #[test]
    fn test_mdct_正弦谱峰幅度约定() {
        let n = 256;
        let mdct = Mdct::new(n);
        let w = block_window(n, n / 2, n / 2);
        // 取 MDCT 第 k 个基频率的正弦
        let k = 10usize;
        let freq = PI / (n / 2) as f32 * (k as f32 + 0.5);
        let windowed: Vec<f32> = (0..n)
            .map(|j| (freq * (j as f32 + 0.5 + n as f32 / 4.0)).cos() * w[j])
            .collect();
        let spec = mdct.forward(&windowed);
        let peak = spec.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        // 4/n 归一化下谱峰应在时域幅度 (1.0) 的量级
        assert!(peak > 0.4 && peak < 2.5, "谱峰幅度异常: {}", peak);
        let peak_bin = spec
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak_bin, k, "谱峰不在期望的 bin");
    }

    #[test]
    fn test_估计器_直流与单音() {
        let n = 64;
        let est = SpectralEstimator::new(n);

        let silence = vec![0.0f32; n];
        assert!(est.magnitudes(&silence).iter().all(|&m| m == 0.0));

        let tone: Vec<f32> = (0..n)
            .map(|j| (2.0 * PI * 8.0 * j as f32 / n as f32).sin())
            .collect();
        let mags = est.magnitudes(&tone);
        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak_bin, 8);
        // 4/n 约定下, 整周期正弦的峰值模约为 2 (实 DFT 半谱折叠)
        assert!((mags[8] - 2.0).abs() < 0.2, "单音模值异常: {}", mags[8]);
    }
}
