//! 编解码管线集成测试: setup 头往返、静音、正弦重建与 bundle 行为.

use qin_codec::config::{
    CodecConfig, FloorSetup, MappingSetup, ModeParams, ResidueSetup, TimeSetup,
};
use qin_codec::floor0::Floor0Params;
use qin_codec::mapping0::Mapping0Params;
use qin_codec::psy::PsyParams;
use qin_codec::registry::BackendRegistry;
use qin_codec::residue0::Residue0Params;
use qin_codec::stream::{BlockFlags, StreamContext};
use qin_codec::time0::Time0Params;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 单 submap 测试配置
fn mono_config(blocksizes: [usize; 2]) -> CodecConfig {
    init_logging();
    CodecConfig {
        channels: 1,
        sample_rate: 44100,
        blocksizes,
        psys: vec![PsyParams::default()],
        times: vec![TimeSetup {
            type_code: 0,
            params: Box::new(Time0Params),
        }],
        floors: vec![FloorSetup {
            type_code: 0,
            params: Box::new(Floor0Params {
                posts: 16,
                amp_bits: 6,
            }),
        }],
        residues: vec![ResidueSetup {
            type_code: 0,
            params: Box::new(Residue0Params {
                begin: 0,
                end: 4096,
                partition_size: 16,
                value_bits: 8,
            }),
        }],
        mappings: vec![MappingSetup {
            type_code: 0,
            params: Box::new(Mapping0Params {
                submaps: 1,
                mux: vec![0],
                time_submap: vec![0],
                floor_submap: vec![0],
                residue_submap: vec![0],
                psy_submap: vec![0],
            }),
        }],
        modes: vec![
            ModeParams {
                block_flag: false,
                mapping: 0,
            },
            ModeParams {
                block_flag: true,
                mapping: 0,
            },
        ],
    }
}

/// 双声道双 submap 测试配置 (每声道独立 submap)
fn stereo_two_submap_config() -> CodecConfig {
    let mut config = mono_config([256, 256]);
    config.channels = 2;
    config.mappings = vec![MappingSetup {
        type_code: 0,
        params: Box::new(Mapping0Params {
            submaps: 2,
            mux: vec![0, 1],
            time_submap: vec![0, 0],
            floor_submap: vec![0, 0],
            residue_submap: vec![0, 0],
            psy_submap: vec![0, 0],
        }),
    }];
    config
}

#[test]
fn test_setup头往返保持结构() {
    let registry = BackendRegistry::builtin();
    let enc = StreamContext::begin_stream(mono_config([64, 256]), &registry).unwrap();
    let header = enc.setup_header().unwrap();

    let dec = StreamContext::from_setup_header(&header, &registry).unwrap();
    let c = dec.config();
    assert_eq!(c.channels, 1);
    assert_eq!(c.sample_rate, 44100);
    assert_eq!(c.blocksizes, [64, 256]);
    assert_eq!(c.modes.len(), 2);
    assert!(!c.modes[0].block_flag);
    assert!(c.modes[1].block_flag);
}

#[test]
fn test_损坏的setup头被拒绝() {
    let registry = BackendRegistry::builtin();
    let enc = StreamContext::begin_stream(mono_config([64, 256]), &registry).unwrap();
    let header = enc.setup_header().unwrap();

    // 截断
    assert!(StreamContext::from_setup_header(&header[..header.len() / 2], &registry).is_err());

    // 声道数清零
    let mut bad = header.clone();
    bad[0] = 0;
    assert!(StreamContext::from_setup_header(&bad, &registry).is_err());

    // 块长指数字段破坏 (偏移 40 位处为 log2 对)
    let mut bad = header.clone();
    bad[5] = 0xff;
    assert!(StreamContext::from_setup_header(&bad, &registry).is_err());
}

#[test]
fn test_静音块解码为精确零() {
    let registry = BackendRegistry::builtin();
    let mut ctx = StreamContext::begin_stream(mono_config([64, 256]), &registry).unwrap();

    for mode in 0..2 {
        let n = if mode == 1 { 256 } else { 64 };
        let pcm = vec![vec![0.0f32; n]];
        let packet = ctx
            .encode_block(
                &pcm,
                BlockFlags {
                    mode,
                    prev_window_long: mode == 1,
                    next_window_long: mode == 1,
                },
            )
            .unwrap();
        let decoded = ctx.decode_block(&packet).unwrap();
        assert_eq!(decoded.block_flag, mode == 1);
        assert_eq!(decoded.nonzero, vec![false]);
        assert_eq!(decoded.pcm[0].len(), n);
        assert!(decoded.pcm[0].iter().all(|&x| x == 0.0), "静音块应输出精确零");
    }
}

/// 把 `signal` 按 50% 重叠切块编解码, 重叠累加重建
fn round_trip_ola(signal: &[f32], n: usize, mode: usize) -> Vec<f32> {
    let registry = BackendRegistry::builtin();
    let mut enc = StreamContext::begin_stream(mono_config([n, n]), &registry).unwrap();
    let mut dec = StreamContext::begin_stream(mono_config([n, n]), &registry).unwrap();

    let hop = n / 2;
    let mut out = vec![0.0f32; signal.len()];
    let blocks = signal.len() / hop - 1;
    for b in 0..blocks {
        let start = b * hop;
        let pcm = vec![signal[start..start + n].to_vec()];
        let packet = enc
            .encode_block(
                &pcm,
                BlockFlags {
                    mode,
                    prev_window_long: true,
                    next_window_long: true,
                },
            )
            .unwrap();
        let decoded = dec.decode_block(&packet).unwrap();
        for (i, &x) in decoded.pcm[0].iter().enumerate() {
            out[start + i] += x;
        }
    }
    out
}

#[test]
fn test_正弦往返重建() {
    let n = 256;
    let total = n * 16;
    // 落在 bin 中心的正弦, 幅度明显高于量化噪声
    let cycles = 20.0;
    let signal: Vec<f32> = (0..total)
        .map(|i| {
            0.3 * (2.0 * std::f32::consts::PI * cycles * i as f32 / n as f32).sin()
        })
        .collect();

    let out = round_trip_ola(&signal, n, 1);

    // 跳过首尾各一个半块 (重叠累加不完整)
    let lo = n;
    let hi = total - n;
    let mut err = 0.0f64;
    let mut ref_pow = 0.0f64;
    for i in lo..hi {
        let d = f64::from(out[i] - signal[i]);
        err += d * d;
        ref_pow += f64::from(signal[i]) * f64::from(signal[i]);
    }
    let rel_rms = (err / ref_pow).sqrt();
    assert!(rel_rms < 0.35, "正弦重建相对 RMS 误差过大: {}", rel_rms);
}

#[test]
fn test_双submap静音声道不进bundle() {
    let registry = BackendRegistry::builtin();
    let mut ctx = StreamContext::begin_stream(stereo_two_submap_config(), &registry).unwrap();

    let n = 256;
    // 声道 0 静音, 声道 1 带正弦
    let pcm = vec![
        vec![0.0f32; n],
        (0..n)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 20.0 * i as f32 / n as f32).sin())
            .collect(),
    ];
    let packet = ctx
        .encode_block(
            &pcm,
            BlockFlags {
                mode: 0,
                prev_window_long: false,
                next_window_long: false,
            },
        )
        .unwrap();
    let decoded = ctx.decode_block(&packet).unwrap();
    assert_eq!(decoded.nonzero, vec![false, true]);
    assert!(decoded.pcm[0].iter().all(|&x| x == 0.0), "静音声道应输出精确零");
    assert!(
        decoded.pcm[1].iter().any(|&x| x.abs() > 1e-3),
        "信号声道不应被解码为静音",
    );
}

#[test]
fn test_双submap声道互不串扰() {
    let registry = BackendRegistry::builtin();
    let mut enc = StreamContext::begin_stream(stereo_two_submap_config(), &registry).unwrap();
    let mut dec = StreamContext::begin_stream(stereo_two_submap_config(), &registry).unwrap();

    let n = 256;
    let total = n * 8;
    let freq = |cycles: f32, i: usize| {
        0.3 * (2.0 * std::f32::consts::PI * cycles * i as f32 / n as f32).sin()
    };
    let ch0: Vec<f32> = (0..total).map(|i| freq(12.0, i)).collect();
    let ch1: Vec<f32> = (0..total).map(|i| freq(40.0, i)).collect();

    let hop = n / 2;
    let mut out0 = vec![0.0f32; total];
    let mut out1 = vec![0.0f32; total];
    for b in 0..total / hop - 1 {
        let start = b * hop;
        let pcm = vec![
            ch0[start..start + n].to_vec(),
            ch1[start..start + n].to_vec(),
        ];
        let packet = enc
            .encode_block(
                &pcm,
                BlockFlags {
                    mode: 0,
                    prev_window_long: false,
                    next_window_long: false,
                },
            )
            .unwrap();
        let decoded = dec.decode_block(&packet).unwrap();
        for i in 0..n {
            out0[start + i] += decoded.pcm[0][i];
            out1[start + i] += decoded.pcm[1][i];
        }
    }

    // Goertzel 式单 bin 功率: 每个声道的自有频率应保留, 对方频率应微弱
    let tone_power = |x: &[f32], cycles: f32| -> f64 {
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for (i, &v) in x.iter().enumerate() {
            let ph = 2.0 * std::f64::consts::PI * f64::from(cycles) * i as f64 / n as f64;
            re += f64::from(v) * ph.cos();
            im += f64::from(v) * ph.sin();
        }
        (re * re + im * im) / (x.len() as f64 * x.len() as f64)
    };

    let mid0 = &out0[n..total - n];
    let mid1 = &out1[n..total - n];
    assert!(
        tone_power(mid0, 12.0) > 100.0 * tone_power(mid0, 40.0),
        "声道 0 中出现了声道 1 的频率成分",
    );
    assert!(
        tone_power(mid1, 40.0) > 100.0 * tone_power(mid1, 12.0),
        "声道 1 中出现了声道 0 的频率成分",
    );
}

#[test]
fn test_同一包重复解码结果逐位一致() {
    let registry = BackendRegistry::builtin();
    let mut enc = StreamContext::begin_stream(mono_config([64, 256]), &registry).unwrap();
    let header = enc.setup_header().unwrap();

    let n = 256;
    let pcm = vec![(0..n)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 20.0 * i as f32 / n as f32).sin())
        .collect::<Vec<f32>>()];
    let packet = enc
        .encode_block(
            &pcm,
            BlockFlags {
                mode: 1,
                prev_window_long: true,
                next_window_long: true,
            },
        )
        .unwrap();

    let as_bits = |pcm: &[Vec<f32>]| -> Vec<Vec<u32>> {
        pcm.iter()
            .map(|ch| ch.iter().map(|x| x.to_bits()).collect())
            .collect()
    };

    // 同一上下文内连续解码两次
    let mut dec = StreamContext::from_setup_header(&header, &registry).unwrap();
    let first = as_bits(&dec.decode_block(&packet).unwrap().pcm);
    let second = as_bits(&dec.decode_block(&packet).unwrap().pcm);
    assert_eq!(first, second, "同一上下文重复解码应逐位一致");

    // 独立构造的注册表与上下文
    let registry2 = BackendRegistry::builtin();
    let mut dec2 = StreamContext::from_setup_header(&header, &registry2).unwrap();
    let third = as_bits(&dec2.decode_block(&packet).unwrap().pcm);
    assert_eq!(first, third, "独立注册表解码同一包应逐位一致");
}

#[test]
fn test_非法输入被拒绝() {
    let registry = BackendRegistry::builtin();
    let mut ctx = StreamContext::begin_stream(mono_config([64, 256]), &registry).unwrap();

    // mode 越界
    let pcm = vec![vec![0.0f32; 64]];
    assert!(ctx
        .encode_block(
            &pcm,
            BlockFlags {
                mode: 7,
                prev_window_long: false,
                next_window_long: false,
            },
        )
        .is_err());

    // 样本数与块长不符
    let pcm = vec![vec![0.0f32; 100]];
    assert!(ctx
        .encode_block(
            &pcm,
            BlockFlags {
                mode: 0,
                prev_window_long: false,
                next_window_long: false,
            },
        )
        .is_err());

    // 声道数不符
    let pcm = vec![vec![0.0f32; 64], vec![0.0f32; 64]];
    assert!(ctx
        .encode_block(
            &pcm,
            BlockFlags {
                mode: 0,
                prev_window_long: false,
                next_window_long: false,
            },
        )
        .is_err());

    // 空包与非音频包
    assert!(ctx.decode_block(&[]).is_err());
    assert!(ctx.decode_block(&[0x01]).is_err());
}

#[test]
fn test_非法配置不能开始流() {
    let registry = BackendRegistry::builtin();

    // 块长非 2 的幂
    let mut config = mono_config([64, 256]);
    config.blocksizes = [100, 256];
    assert!(StreamContext::begin_stream(config, &registry).is_err());

    // mode 引用不存在的 mapping
    let mut config = mono_config([64, 256]);
    config.modes[0].mapping = 3;
    assert!(StreamContext::begin_stream(config, &registry).is_err());

    // mux 指向不存在的 submap
    let mut config = stereo_two_submap_config();
    config.mappings[0].params = Box::new(Mapping0Params {
        submaps: 2,
        mux: vec![0, 5],
        time_submap: vec![0, 0],
        floor_submap: vec![0, 0],
        residue_submap: vec![0, 0],
        psy_submap: vec![0, 0],
    });
    assert!(StreamContext::begin_stream(config, &registry).is_err());
}
