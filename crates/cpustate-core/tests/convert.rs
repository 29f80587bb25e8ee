//! Tests for conversion between kernel layouts and the register model

use cpustate_core::prelude::*;
use cpustate_utils::init_test_logging;
use proptest::prelude::*;

fn bytes(len: usize) -> impl Strategy<Value = Vec<u8>>
{
    prop::collection::vec(any::<u8>(), len)
}

/// Load `raw` into a fresh state and project it back onto a copy of itself.
fn round_trip<A: Arch, S: RawSnapshot<A>>(raw: &S) -> S
{
    let mut state = PlatformState::<A>::new();
    state.fill_from(raw);
    let mut out = *raw;
    state.fill_struct(&mut out);
    out
}

#[test]
fn test_fill_regs_x86_64()
{
    init_test_logging();
    let raw = UserRegsX86_64 {
        rax: 1,
        rbx: 2,
        r15: 15,
        rip: 0x40_1000,
        rsp: 0x7ffe_f000,
        eflags: 0x246,
        cs: 0x33,
        ss: 0x2b,
        fs_base: 0x7f00_0000_0000,
        orig_rax: u64::MAX,
        ..Default::default()
    };

    let mut state = PlatformState::<X86_64>::new();
    state.fill_from(&raw);

    assert!(state.x86().filled);
    assert!(state.x86().bases_filled);
    assert!(!state.x87().filled);
    assert_eq!(state.x86().gpr(Gpr::Bx.index()), 2);
    assert_eq!(state.x86().gpr(Gpr::R15.index()), 15);
    assert_eq!(state.stack_pointer(), 0x7ffe_f000);
    assert_eq!(state.x86().segment(SegmentRegister::Cs), 0x33);
    assert_eq!(state.value("fs_base").and_then(|r| r.as_u64()), Some(0x7f00_0000_0000));
    assert_eq!(state.value("orig_rax").and_then(|r| r.as_u64()), Some(u64::MAX));
    assert_eq!(state.flags_string(), "c P a Z s t I d o");
}

#[test]
fn test_fill_regs_x86()
{
    let raw = UserRegsX86 {
        eax: 0xaabb_ccdd,
        esp: 0xbfff_0000,
        eip: 0x0804_8000,
        xcs: 0xdead_0073,
        ..Default::default()
    };

    let mut state = PlatformState::<X86>::new();
    state.fill_from(&raw);

    assert_eq!(state.value("ah").and_then(|r| r.as_u64()), Some(0xcc));
    assert_eq!(state.value("eip").and_then(|r| r.as_u64()), Some(0x0804_8000));
    assert_eq!(state.x86().segment(SegmentRegister::Cs), 0x73);
    assert!(state.value("fs_base").is_none());
}

#[test]
fn test_fill_struct_preserves_segment_high_bits_x86()
{
    let raw = UserRegsX86 {
        xds: 0xffff_007b,
        ..Default::default()
    };
    let mut state = PlatformState::<X86>::new();
    state.fill_from(&raw);
    state.x86_mut().set_segment(SegmentRegister::Ds, 0x2b);

    let mut out = raw;
    state.fill_struct(&mut out);
    assert_eq!(out.xds, 0xffff_002b);
}

#[test]
fn test_fill_struct_preserves_segment_high_bits_x86_64()
{
    let raw = UserRegsX86_64 {
        cs: 0x0001_0000_0000_0033,
        gs: 0xffff_ffff_ffff_0000,
        ..Default::default()
    };
    let mut state = PlatformState::<X86_64>::new();
    state.fill_from(&raw);
    assert_eq!(state.x86().segment(SegmentRegister::Cs), 0x33);

    let mut out = raw;
    state.fill_struct(&mut out);
    assert_eq!(out, raw);

    state.x86_mut().set_segment(SegmentRegister::Gs, 0x2b);
    state.fill_struct(&mut out);
    assert_eq!(out.gs, 0xffff_ffff_ffff_002b);
}

#[test]
fn test_fill_fxsave_x86_64()
{
    let mut raw = UserFpRegsX86_64 {
        cwd: 0x37f,
        swd: 6 << 11,
        ftw: 0b0100_0000,
        fop: 0x1d9,
        rip: 0x40_2000,
        mxcsr: 0x1f80,
        mxcr_mask: 0xffff,
        ..Default::default()
    };
    // ST(0) = 1.0, which lives in R6 with TOP = 6
    raw.st_space[0] = 0;
    raw.st_space[1] = 0x8000_0000;
    raw.st_space[2] = 0x3fff;
    raw.xmm_space[4] = 0x1234_5678;

    let mut state = PlatformState::<X86_64>::new();
    state.fill_from(&raw);

    assert!(state.x87().filled);
    assert!(state.x87().op_code_filled);
    assert!(state.avx().xmm_filled);
    assert!(state.avx().mxcsr_mask_filled);
    assert!(!state.x86().filled);

    assert_eq!(state.fpu_register(0), Value80::from_parts(0x3fff, 1 << 63));
    assert_eq!(state.fpu_register_tag(0), FpuTag::Valid);
    assert!(state.fpu_register_is_empty(1));
    assert_eq!(state.x87().tag(6), FpuTag::Valid);
    assert_eq!(state.fpu_tag_word(), 0xffff & !(0b11 << 12));
    assert_eq!(state.xmm_register(1), Value128::from_u128(0x1234_5678));
    assert_eq!(state.value("fop").and_then(|r| r.as_u64()), Some(0x1d9));
    assert_eq!(state.value("fip").and_then(|r| r.as_u64()), Some(0x40_2000));
    assert_eq!(state.avx().mxcsr_mask, 0xffff);
}

#[test]
fn test_fill_fsave_x86_keeps_opcode()
{
    let mut raw = UserFpRegsX86 {
        cwd: 0xffff_037f,
        swd: 0,
        twd: 0xfffc,
        ..Default::default()
    };
    raw.st_space[2] = 0x3fff;

    let mut state = PlatformState::<X86>::new();
    state.x87_mut().op_code = 0x55;
    state.fill_from(&raw);

    assert!(state.x87().filled);
    assert!(!state.x87().op_code_filled);
    assert_eq!(state.x87().op_code, 0x55);
    assert_eq!(state.fpu_control_word(), 0x37f);
    assert_eq!(state.fpu_register_tag(0), FpuTag::Valid);
    assert!(state.fpu_register_is_empty(1));
    assert!(state.value("fop").is_none());
    assert!(!state.avx().xmm_filled);
}

#[test]
fn test_fsave_packs_registers_ten_bytes_apart()
{
    let mut raw = UserFpRegsX86::default();
    // ST(1) starts at byte 10, its exponent at bytes 18..20
    bytemuck::bytes_of_mut(&mut raw.st_space)[18] = 0xff;
    bytemuck::bytes_of_mut(&mut raw.st_space)[19] = 0x7f;

    let mut state = PlatformState::<X86>::new();
    state.fill_from(&raw);
    assert_eq!(state.fpu_register(1).exponent(), 0x7fff);
    assert_eq!(state.fpu_register(0).exponent(), 0);
}

#[test]
fn test_fill_fxsave_x86_loads_eight_xmm()
{
    let mut raw = UserFpxRegsX86::default();
    raw.xmm_space[28] = 0xfeed;
    raw.padding[0] = 0xdead;
    raw.reserved = 0xffbf;

    let mut state = PlatformState::<X86>::new();
    state.fill_from(&raw);

    assert_eq!(state.xmm_register(7), Value128::from_u128(0xfeed));
    assert_eq!(state.avx().mxcsr_mask, 0xffbf);

    let mut out = raw;
    state.avx_mut().set_xmm(0, Value128::from_u128(9));
    state.fill_struct(&mut out);
    assert_eq!(out.xmm_space[0], 9);
    assert_eq!(out.padding[0], 0xdead);
}

#[test]
fn test_fill_struct_skips_unfilled_bases_and_mask()
{
    let raw = UserRegsX86_64 {
        fs_base: 0x1111,
        gs_base: 0x2222,
        ..Default::default()
    };
    let state = PlatformState::<X86_64>::new();
    let mut out = raw;
    state.fill_struct(&mut out);
    assert_eq!(out.fs_base, 0x1111);
    assert_eq!(out.gs_base, 0x2222);

    let fp = UserFpRegsX86_64 {
        mxcr_mask: 0xffff,
        fop: 0x7ff,
        ..Default::default()
    };
    let mut out = fp;
    state.fill_struct(&mut out);
    assert_eq!(out.mxcr_mask, 0xffff);
    assert_eq!(out.fop, 0x7ff);
}

#[test]
fn test_incremental_fill_keeps_categories()
{
    init_test_logging();
    let regs = UserRegsX86_64 {
        rax: 0x42,
        rip: 0x1000,
        ..Default::default()
    };
    let mut fp = UserFpRegsX86_64::default();
    fp.xmm_space[0] = 0x99;

    let mut state = PlatformState::<X86_64>::new();
    state.fill_from(&regs);
    state.fill_from(&fp);

    assert!(state.x86().filled);
    assert!(state.x87().filled);
    assert!(state.avx().xmm_filled);
    assert_eq!(state.value("rax").and_then(|r| r.as_u64()), Some(0x42));
    assert_eq!(state.xmm_register(0), Value128::from_u128(0x99));

    // Reloading the general registers leaves the vector state alone
    state.fill_from(&UserRegsX86_64::default());
    assert_eq!(state.value("rax").and_then(|r| r.as_u64()), Some(0));
    assert_eq!(state.xmm_register(0), Value128::from_u128(0x99));
}

#[test]
fn test_edit_and_write_back()
{
    let raw = UserRegsX86_64 {
        rip: 0x40_1005,
        rax: 0xffff_ffff_ffff_ffff,
        ..Default::default()
    };
    let mut state = PlatformState::<X86_64>::new();
    state.fill_from(&raw);
    state.set_instruction_pointer(0x40_1004);
    state.set_register("eax", 0);

    let mut out = raw;
    state.fill_struct(&mut out);
    assert_eq!(out.rip, 0x40_1004);
    assert_eq!(out.rax, 0);
}

#[test]
fn test_as_bytes_matches_from_bytes()
{
    let raw = UserRegsX86 {
        ebx: 0x0403_0201,
        ..Default::default()
    };
    assert_eq!(&raw.as_bytes()[..4], &[1, 2, 3, 4]);
    assert_eq!(UserRegsX86::from_bytes(raw.as_bytes()), Ok(raw));
}

#[test]
fn test_regs_bytes_use_architecture_layout()
{
    let raw = UserRegsX86 {
        ecx: 0x1234,
        eip: 0x0804_8000,
        ..Default::default()
    };
    let mut buf = raw.as_bytes().to_vec();
    buf.extend_from_slice(&[0xee; 4]);

    let mut state = PlatformState::<X86>::new();
    state.fill_from_regs_bytes(&buf).unwrap();
    assert!(state.x86().filled);
    assert_eq!(state.value("ecx").and_then(|r| r.as_u64()), Some(0x1234));

    state.set_instruction_pointer(0x0804_8010);
    state.fill_regs_bytes(&mut buf).unwrap();
    assert_eq!(UserRegsX86::from_bytes(&buf).unwrap().eip, 0x0804_8010);
    assert_eq!(&buf[68..], &[0xee; 4]);
}

#[test]
fn test_regs_bytes_rejects_short_buffer()
{
    let mut state = PlatformState::<X86_64>::new();
    let err = state.fill_from_regs_bytes(&[0u8; 68]).unwrap_err();
    assert_eq!(
        err,
        StateError::TruncatedSnapshot {
            layout: "x86-64 user_regs_struct",
            expected: 216,
            actual: 68,
        }
    );
    assert!(!state.x86().filled);

    let mut short = [0u8; 100];
    assert!(state.fill_regs_bytes(&mut short).is_err());
    assert_eq!(short, [0u8; 100]);
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
#[test]
fn test_libc_user_regs_conversion()
{
    let raw = UserRegsX86_64 {
        rip: 0xabc,
        r12: 12,
        ..Default::default()
    };
    let native: libc::user_regs_struct = raw.into();
    assert_eq!(native.rip, 0xabc);
    assert_eq!(UserRegsX86_64::from(native), raw);
}

proptest! {
    #[test]
    fn prop_regs_x86_round_trip(data in bytes(68))
    {
        let raw = UserRegsX86::from_bytes(&data).unwrap();
        prop_assert_eq!(round_trip::<X86, _>(&raw), raw);
    }

    #[test]
    fn prop_regs_x86_64_round_trip(data in bytes(216))
    {
        let raw = UserRegsX86_64::from_bytes(&data).unwrap();
        prop_assert_eq!(round_trip::<X86_64, _>(&raw), raw);
    }

    #[test]
    fn prop_fsave_x86_round_trip(data in bytes(108))
    {
        let raw = UserFpRegsX86::from_bytes(&data).unwrap();
        prop_assert_eq!(round_trip::<X86, _>(&raw), raw);
    }

    #[test]
    fn prop_fxsave_x86_round_trip(data in bytes(512))
    {
        let raw = UserFpxRegsX86::from_bytes(&data).unwrap();
        prop_assert_eq!(round_trip::<X86, _>(&raw), raw);
    }

    #[test]
    fn prop_fxsave_x86_64_round_trip(data in bytes(512))
    {
        let raw = UserFpRegsX86_64::from_bytes(&data).unwrap();
        prop_assert_eq!(round_trip::<X86_64, _>(&raw), raw);
    }

    #[test]
    fn prop_set_xmm_keeps_upper_bits(lane in 0usize..16, zmm in bytes(64), xmm in any::<u128>())
    {
        let mut state = PlatformState::<X86_64>::new();
        let zmm = Value512::from_slice(&zmm).unwrap();
        state.avx_mut().set_zmm(lane, zmm);
        state.avx_mut().set_xmm(lane, Value128::from_u128(xmm));

        prop_assert_eq!(state.xmm_register(lane).as_u128(), xmm);
        let ymm = state.ymm_register(lane);
        let zmm_now = state.zmm_register(lane);
        prop_assert_eq!(&ymm.bytes()[16..], &zmm.bytes()[16..32]);
        prop_assert_eq!(&zmm_now.bytes()[16..], &zmm.bytes()[16..]);
    }

    #[test]
    fn prop_st_and_r_index_are_inverse(top in 0u16..8, n in 0usize..8)
    {
        let mut x87 = FpuState::<X86_64>::new();
        x87.status_word = top << 11;
        let r = x87.st_index_to_r_index(n);
        prop_assert_eq!(r, (n + top as usize) % 8);
        prop_assert_eq!(x87.r_index_to_st_index(r), n);
    }

    #[test]
    fn prop_empty_bit_wins_over_contents(data in bytes(80), abridged in any::<u8>())
    {
        let mut x87 = FpuState::<X86_64>::new();
        for r in 0..8 {
            x87.set_register_physical(r, Value80::from_slice(&data[r * 10..]).unwrap());
        }
        let tag = x87.restore_tag_word(abridged);
        x87.tag_word = tag;
        for r in 0..8 {
            prop_assert_eq!(x87.tag(r) == FpuTag::Empty, abridged & (1 << r) == 0);
        }
        prop_assert_eq!(x87.abridged_tag_word(), abridged);
    }

    #[test]
    fn prop_eax_write_zero_extends(initial in any::<u64>(), value in any::<u32>())
    {
        let mut state = PlatformState::<X86_64>::new();
        state.x86_mut().set_gpr(Gpr::Ax.index(), initial);
        state.set_register("eax", u64::from(value));
        prop_assert_eq!(state.x86().gpr(Gpr::Ax.index()), u64::from(value));
    }

    #[test]
    fn prop_ax_write_changes_low_16_only(initial in any::<u64>(), value in any::<u16>())
    {
        let mut state = PlatformState::<X86_64>::new();
        state.x86_mut().set_gpr(Gpr::Ax.index(), initial);
        state.set_register("ax", u64::from(value));
        prop_assert_eq!(state.x86().gpr(Gpr::Ax.index()), (initial & !0xffff) | u64::from(value));
    }
}
