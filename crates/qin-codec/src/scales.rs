//! 线性幅度与 dB / Bark 感知尺度之间的换算.
//!
//! 心理声学模型与 floor 后端都在 dB 域工作, 掩蔽扩散在 Bark 域进行.
//! 满刻度幅度 1.0 对应 0 dB.

/// 静音幅度对应的哨兵 dB 值
pub const SILENCE_DB: f32 = -400.0;

/// 线性幅度 -> dB (20·log10)
pub fn to_db(x: f32) -> f32 {
    let a = x.abs();
    if a == 0.0 { SILENCE_DB } else { a.ln() * 8.685_889_6 }
}

/// dB -> 线性幅度
pub fn from_db(db: f32) -> f32 {
    (db * 0.115_129_25).exp()
}

/// 频率 (Hz) -> Bark
///
/// 近似公式, 在 0 - 30kHz 范围内有效.
pub fn to_bark(hz: f32) -> f32 {
    13.1 * (0.000_74 * hz).atan() + 2.24 * (hz * hz * 1.85e-8).atan() + 1e-4 * hz
}

/// 绝对听阈 (dBFS 近似, 以 0 dBFS ≈ 96 dB SPL 折算)
///
/// 经典三段近似公式; 纯粹是调优值, 不参与线上格式.
pub fn ath_db(hz: f32) -> f32 {
    let f = (hz.max(20.0)) * 0.001;
    let spl = 3.64 * f.powf(-0.8) - 6.5 * (-0.6 * (f - 3.3) * (f - 3.3)).exp()
        + 1e-3 * f.powf(4.0);
    (spl - 96.0).min(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_往返() {
        for &a in &[1.0f32, 0.5, 0.01, 1e-6] {
            let back = from_db(to_db(a));
            assert!((back - a).abs() / a < 1e-3, "dB 往返失败: {}", a);
        }
        assert_eq!(to_db(0.0), SILENCE_DB);
    }

    #[test]
    fn test_bark_单调递增() {
        let mut prev = to_bark(0.0);
        for hz in (100..24000).step_by(100) {
            let b = to_bark(hz as f32);
            assert!(b > prev, "Bark 在 {} Hz 处不单调", hz);
            prev = b;
        }
    }

    #[test]
    fn test_ath_中频最低() {
        // 3-4kHz 附近是人耳最敏感区, 听阈应低于 100Hz 与 15kHz 处
        let mid = ath_db(3500.0);
        assert!(mid < ath_db(100.0));
        assert!(mid < ath_db(15000.0));
    }
}
