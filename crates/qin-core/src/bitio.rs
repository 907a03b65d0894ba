//! 比特流读写器.
//!
//! 提供按位读写字节缓冲区的能力, 是编解码核心的基础设施.
//!
//! 按小端位序 (LSB first) 读写: 每个字节的最低有效位先出现在流中,
//! 多位字段的低位在前. 这是本编码器线上格式固定采用的位序,
//! 读写两侧必须严格一致.

use crate::{QinError, QinResult};

/// LSB-first 比特流读取器
///
/// # 示例
/// ```
/// use qin_core::bitio::LsbBitReader;
///
/// let data = [0b1011_0010];
/// let mut br = LsbBitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b0010);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// ```
pub struct LsbBitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前位偏移 (自流起点)
    bit_pos: usize,
}

impl<'a> LsbBitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        self.data
            .len()
            .saturating_mul(8)
            .saturating_sub(self.bit_pos)
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 获取当前位偏移
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// 读取 1 个位并解释为布尔标志
    pub fn read_flag(&mut self) -> QinResult<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按小端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> QinResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits: n={} 超过 32 位",
                n,
            )));
        }
        if self.bits_left() < n as usize {
            return Err(QinError::Eof);
        }

        let mut out = 0u32;
        let mut filled = 0u32;
        while filled < n {
            let byte = self.data[self.bit_pos / 8];
            let offset = (self.bit_pos % 8) as u32;
            let available = 8 - offset;
            let take = (n - filled).min(available);

            let mask = if take >= 32 { u32::MAX } else { (1u32 << take) - 1 };
            let bits = (u32::from(byte) >> offset) & mask;
            out |= bits << filled;

            self.bit_pos += take as usize;
            filled += take;
        }
        Ok(out)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&mut self, n: u32) -> QinResult<u32> {
        let saved = self.bit_pos;
        let result = self.read_bits(n);
        self.bit_pos = saved;
        result
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: u32) -> QinResult<()> {
        if self.bits_left() < n as usize {
            return Err(QinError::Eof);
        }
        self.bit_pos += n as usize;
        Ok(())
    }
}

/// LSB-first 比特流写入器
///
/// # 示例
/// ```
/// use qin_core::bitio::{LsbBitReader, LsbBitWriter};
///
/// let mut bw = LsbBitWriter::new();
/// bw.write_bits(0b0010, 4);
/// bw.write_bits(0b1011, 4);
/// let data = bw.finish();
/// assert_eq!(data, vec![0b1011_0010]);
/// ```
#[derive(Default)]
pub struct LsbBitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u32,
}

impl LsbBitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 以指定字节容量创建比特流写入器
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            current_byte: 0,
            bit_count: 0,
        }
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个布尔标志位
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bits(u32::from(flag), 1);
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 低位在前 (小端位序).
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={} 超过 32 位", n);

        let mut remaining = n;
        let mut value = value;
        while remaining > 0 {
            let available = 8 - self.bit_count;
            let take = remaining.min(available);

            let mask = if take >= 32 { u32::MAX } else { (1u32 << take) - 1 };
            let bits = (value & mask) as u8;
            self.current_byte |= bits << self.bit_count;
            self.bit_count += take;

            if self.bit_count >= 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            value = if take >= 32 { 0 } else { value >> take };
            remaining -= take;
        }
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 自动用 0 填充高位.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
        self.data
    }
}

/// 返回表示 v 所需的最少位数 (ilog(0) = 0, ilog(1) = 1, ilog(7) = 3)
pub fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}
