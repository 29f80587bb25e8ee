//! # x86 (i386) Kernel Register Layouts
//!
//! `struct user_regs_struct`, `struct user_fpregs_struct` and
//! `struct user_fpxregs_struct` from `arch/x86/include/asm/user_32.h`.
//!
//! The 32-bit FPU comes in two formats:
//!
//! - FSAVE (`PTRACE_GETFPREGS`): full tag word, registers packed 10 bytes
//!   apart, no opcode, no SSE state
//! - FXSAVE (`PTRACE_GETFPXREGS`): abridged tag word, 16-byte register slots,
//!   opcode, MXCSR and XMM0-XMM7

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use super::{load_st_space, load_xmm_space, store_st_space, store_xmm_space, RawSnapshot};
use crate::state::x86::SegmentRegister;
use crate::state::PlatformState;
use crate::types::{Arch, X86};

/// x86 general-purpose register set (`user_regs_struct`, 68 bytes)
///
/// Segment fields are 32 bits wide; only the low 16 hold the selector.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UserRegsX86
{
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
    pub ebp: u32,
    pub eax: u32,
    pub xds: u32,
    pub xes: u32,
    pub xfs: u32,
    pub xgs: u32,
    pub orig_eax: u32,
    pub eip: u32,
    pub xcs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub xss: u32,
}

/// x86 floating-point register set in FSAVE format
/// (`user_fpregs_struct`, 108 bytes)
///
/// `twd` holds the full tag word. `st_space` holds `ST(0)`-`ST(7)` packed
/// 10 bytes apart.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UserFpRegsX86
{
    pub cwd: u32,
    pub swd: u32,
    pub twd: u32,
    pub fip: u32,
    pub fcs: u32,
    pub foo: u32,
    pub fos: u32,
    pub st_space: [u32; 20],
}

/// x86 floating-point register set in FXSAVE format
/// (`user_fpxregs_struct`, 512 bytes)
///
/// `twd` holds the abridged tag word in its low byte. The kernel calls the
/// word after `mxcsr` `reserved`; FXSAVE stores MXCSR_MASK there.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UserFpxRegsX86
{
    pub cwd: u16,
    pub swd: u16,
    pub twd: u16,
    pub fop: u16,
    pub fip: u32,
    pub fcs: u32,
    pub foo: u32,
    pub fos: u32,
    pub mxcsr: u32,
    pub reserved: u32,
    pub st_space: [u32; 32],
    pub xmm_space: [u32; 32],
    pub padding: [u32; 56],
}

impl Default for UserFpxRegsX86
{
    fn default() -> Self
    {
        Self::zeroed()
    }
}

const _: () = assert!(std::mem::size_of::<UserRegsX86>() == 68);
const _: () = assert!(std::mem::size_of::<UserFpRegsX86>() == 108);
const _: () = assert!(std::mem::size_of::<UserFpxRegsX86>() == 512);

#[cfg(all(target_os = "linux", target_arch = "x86"))]
const _: () = assert!(std::mem::size_of::<UserRegsX86>() == std::mem::size_of::<libc::user_regs_struct>());
#[cfg(all(target_os = "linux", target_arch = "x86"))]
const _: () = assert!(std::mem::size_of::<UserFpRegsX86>() == std::mem::size_of::<libc::user_fpregs_struct>());

/// Replace the low 16 bits of a 32-bit field.
const fn with_low16(field: u32, value: u16) -> u32
{
    (field & 0xffff_0000) | value as u32
}

impl UserRegsX86
{
    /// GPR fields in [`Gpr`](crate::state::x86::Gpr) index order.
    fn gprs(&self) -> [u32; 8]
    {
        [self.eax, self.ecx, self.edx, self.ebx, self.esp, self.ebp, self.esi, self.edi]
    }

    fn gprs_mut(&mut self) -> [&mut u32; 8]
    {
        [
            &mut self.eax,
            &mut self.ecx,
            &mut self.edx,
            &mut self.ebx,
            &mut self.esp,
            &mut self.ebp,
            &mut self.esi,
            &mut self.edi,
        ]
    }

    /// Segment fields in [`SegmentRegister`] index order.
    fn segments(&self) -> [u32; 6]
    {
        [self.xes, self.xcs, self.xss, self.xds, self.xfs, self.xgs]
    }

    fn segments_mut(&mut self) -> [&mut u32; 6]
    {
        [&mut self.xes, &mut self.xcs, &mut self.xss, &mut self.xds, &mut self.xfs, &mut self.xgs]
    }
}

impl RawSnapshot<X86> for UserRegsX86
{
    const LAYOUT: &'static str = "x86 user_regs_struct";

    fn fill_state(&self, state: &mut PlatformState<X86>)
    {
        let regs = state.x86_mut();
        for (n, value) in self.gprs().into_iter().enumerate() {
            regs.set_gpr(n, u64::from(value));
        }
        for (seg, value) in SegmentRegister::ALL.into_iter().zip(self.segments()) {
            regs.set_segment(seg, value as u16);
        }
        regs.set_orig_ax(u64::from(self.orig_eax));
        regs.set_instruction_pointer(u64::from(self.eip));
        regs.set_flags(u64::from(self.eflags));
        regs.filled = true;

        debug!(eip = self.eip, "loaded {}", Self::LAYOUT);
    }

    fn fill_raw(&mut self, state: &PlatformState<X86>)
    {
        let regs = state.x86();
        for (n, field) in self.gprs_mut().into_iter().enumerate() {
            *field = regs.gpr(n) as u32;
        }
        for (seg, field) in SegmentRegister::ALL.into_iter().zip(self.segments_mut()) {
            *field = with_low16(*field, regs.segment(seg));
        }
        self.orig_eax = regs.orig_ax() as u32;
        self.eip = regs.instruction_pointer() as u32;
        self.eflags = regs.flags() as u32;

        debug!(eip = self.eip, "stored {}", Self::LAYOUT);
    }
}

impl RawSnapshot<X86> for UserFpRegsX86
{
    const LAYOUT: &'static str = "x86 user_fpregs_struct";

    fn fill_state(&self, state: &mut PlatformState<X86>)
    {
        let x87 = state.x87_mut();
        x87.control_word = self.cwd as u16;
        x87.status_word = self.swd as u16;
        x87.tag_word = self.twd as u16;
        x87.inst_ptr_offset = u64::from(self.fip);
        x87.data_ptr_offset = u64::from(self.foo);
        x87.inst_ptr_selector = self.fcs as u16;
        x87.data_ptr_selector = self.fos as u16;
        load_st_space(state, bytemuck::bytes_of(&self.st_space), 10);
        state.x87_mut().filled = true;

        debug!(tag_word = self.twd as u16, "loaded {}", Self::LAYOUT);
    }

    fn fill_raw(&mut self, state: &PlatformState<X86>)
    {
        let x87 = state.x87();
        self.cwd = with_low16(self.cwd, x87.control_word);
        self.swd = with_low16(self.swd, x87.status_word);
        self.twd = with_low16(self.twd, x87.tag_word);
        self.fip = x87.inst_ptr_offset as u32;
        self.foo = x87.data_ptr_offset as u32;
        self.fcs = with_low16(self.fcs, x87.inst_ptr_selector);
        self.fos = with_low16(self.fos, x87.data_ptr_selector);
        store_st_space(state, bytemuck::bytes_of_mut(&mut self.st_space), 10);

        debug!("stored {}", Self::LAYOUT);
    }
}

impl RawSnapshot<X86> for UserFpxRegsX86
{
    const LAYOUT: &'static str = "x86 user_fpxregs_struct";

    fn fill_state(&self, state: &mut PlatformState<X86>)
    {
        let x87 = state.x87_mut();
        x87.control_word = self.cwd;
        x87.status_word = self.swd;
        x87.op_code = self.fop;
        x87.inst_ptr_offset = u64::from(self.fip);
        x87.data_ptr_offset = u64::from(self.foo);
        x87.inst_ptr_selector = self.fcs as u16;
        x87.data_ptr_selector = self.fos as u16;

        // Registers go in before the tag word: restoring it reads them.
        load_st_space(state, bytemuck::bytes_of(&self.st_space), 16);
        let x87 = state.x87_mut();
        x87.tag_word = x87.restore_tag_word(self.twd as u8);
        x87.filled = true;
        x87.op_code_filled = true;

        load_xmm_space(state, bytemuck::bytes_of(&self.xmm_space), X86::XMM_REG_COUNT);
        let avx = state.avx_mut();
        avx.mxcsr = self.mxcsr;
        avx.mxcsr_mask = self.reserved;
        avx.xmm_filled = true;
        avx.mxcsr_mask_filled = true;

        debug!(tag_word = state.x87().tag_word, "loaded {}", Self::LAYOUT);
    }

    fn fill_raw(&mut self, state: &PlatformState<X86>)
    {
        let x87 = state.x87();
        self.cwd = x87.control_word;
        self.swd = x87.status_word;
        self.twd = (self.twd & 0xff00) | u16::from(x87.abridged_tag_word());
        if x87.op_code_filled {
            self.fop = x87.op_code;
        }
        self.fip = x87.inst_ptr_offset as u32;
        self.foo = x87.data_ptr_offset as u32;
        self.fcs = with_low16(self.fcs, x87.inst_ptr_selector);
        self.fos = with_low16(self.fos, x87.data_ptr_selector);
        store_st_space(state, bytemuck::bytes_of_mut(&mut self.st_space), 16);

        let avx = state.avx();
        store_xmm_space(state, bytemuck::bytes_of_mut(&mut self.xmm_space), X86::XMM_REG_COUNT);
        self.mxcsr = avx.mxcsr;
        if avx.mxcsr_mask_filled {
            self.reserved = avx.mxcsr_mask;
        }

        debug!("stored {}", Self::LAYOUT);
    }
}
