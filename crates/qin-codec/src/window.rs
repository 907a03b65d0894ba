//! 重叠变换窗函数.
//!
//! 窗形为 sin(π/2 · sin²), 满足 Princen-Bradley 条件
//! (相邻块的上升/下降斜率平方和为 1), 配合 MDCT 实现 50% 重叠完全重建.
//!
//! 长短块混合时, 长块靠近短块的一侧使用短斜率, 斜率居中放置于
//! 该侧的四分之一块区间内, 其余位置为 0 或 1.

/// 斜率采样: 长度为 `slope` 的上升段第 `i` 个样本
fn rise(i: usize, slope: usize) -> f32 {
    let x = (i as f32 + 0.5) / slope as f32 * std::f32::consts::FRAC_PI_2;
    let s = x.sin();
    (std::f32::consts::FRAC_PI_2 * s * s).sin()
}

/// 构建块长为 `n` 的分析/合成窗
///
/// `left_slope`/`right_slope` 为左右斜率长度 (等于相邻块长的一半),
/// 取值必须 ≤ n/2. 两侧均为 n/2 时退化为普通全长窗.
pub fn block_window(n: usize, left_slope: usize, right_slope: usize) -> Vec<f32> {
    debug_assert!(n.is_power_of_two());
    debug_assert!(left_slope <= n / 2 && right_slope <= n / 2);

    let mut w = vec![0.0f32; n];
    let half = n / 2;

    // 左半: 0 填充 → 上升斜率 → 1
    let left_begin = n / 4 - left_slope / 2;
    for i in 0..left_slope {
        w[left_begin + i] = rise(i, left_slope);
    }
    for v in w.iter_mut().take(half).skip(left_begin + left_slope) {
        *v = 1.0;
    }

    // 右半: 1 → 下降斜率 → 0 填充
    let right_begin = half + n / 4 - right_slope / 2;
    for v in w.iter_mut().take(right_begin).skip(half) {
        *v = 1.0;
    }
    for i in 0..right_slope {
        w[right_begin + i] = rise(right_slope - 1 - i, right_slope);
    }

    w
}
