//! # x86-64 Kernel Register Layouts
//!
//! `struct user_regs_struct` and `struct user_fpregs_struct` from
//! `arch/x86/include/asm/user_64.h`, as returned by `PTRACE_GETREGS` and
//! `PTRACE_GETFPREGS` on a 64-bit tracee.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use super::{load_st_space, load_xmm_space, store_st_space, store_xmm_space, RawSnapshot};
use crate::state::x86::{Gpr, SegmentRegister};
use crate::state::PlatformState;
use crate::types::{Arch, X86_64};

/// x86-64 general-purpose register set (`user_regs_struct`, 216 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct UserRegsX86_64
{
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

/// x86-64 floating-point register set in FXSAVE format
/// (`user_fpregs_struct`, 512 bytes)
///
/// `ftw` holds the abridged tag word (one bit per physical register) in its
/// low byte. `st_space` holds `ST(0)`-`ST(7)` in 16-byte slots; `xmm_space`
/// holds XMM0-XMM15.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UserFpRegsX86_64
{
    pub cwd: u16,
    pub swd: u16,
    pub ftw: u16,
    pub fop: u16,
    pub rip: u64,
    pub rdp: u64,
    pub mxcsr: u32,
    pub mxcr_mask: u32,
    pub st_space: [u32; 32],
    pub xmm_space: [u32; 64],
    pub padding: [u32; 24],
}

impl Default for UserFpRegsX86_64
{
    fn default() -> Self
    {
        Self::zeroed()
    }
}

const _: () = assert!(std::mem::size_of::<UserRegsX86_64>() == 216);
const _: () = assert!(std::mem::size_of::<UserFpRegsX86_64>() == 512);

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const _: () = assert!(std::mem::size_of::<UserRegsX86_64>() == std::mem::size_of::<libc::user_regs_struct>());
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
const _: () = assert!(std::mem::size_of::<UserFpRegsX86_64>() == std::mem::size_of::<libc::user_fpregs_struct>());

impl UserRegsX86_64
{
    /// GPR fields in [`Gpr`] index order.
    fn gprs(&self) -> [u64; 16]
    {
        [
            self.rax, self.rcx, self.rdx, self.rbx, self.rsp, self.rbp, self.rsi, self.rdi, self.r8, self.r9, self.r10,
            self.r11, self.r12, self.r13, self.r14, self.r15,
        ]
    }

    /// Mutable GPR fields in [`Gpr`] index order.
    fn gprs_mut(&mut self) -> [&mut u64; 16]
    {
        [
            &mut self.rax,
            &mut self.rcx,
            &mut self.rdx,
            &mut self.rbx,
            &mut self.rsp,
            &mut self.rbp,
            &mut self.rsi,
            &mut self.rdi,
            &mut self.r8,
            &mut self.r9,
            &mut self.r10,
            &mut self.r11,
            &mut self.r12,
            &mut self.r13,
            &mut self.r14,
            &mut self.r15,
        ]
    }

    /// Segment fields in [`SegmentRegister`] index order.
    fn segments(&self) -> [u64; 6]
    {
        [self.es, self.cs, self.ss, self.ds, self.fs, self.gs]
    }

    /// Mutable segment fields in [`SegmentRegister`] index order.
    fn segments_mut(&mut self) -> [&mut u64; 6]
    {
        [&mut self.es, &mut self.cs, &mut self.ss, &mut self.ds, &mut self.fs, &mut self.gs]
    }
}

impl RawSnapshot<X86_64> for UserRegsX86_64
{
    const LAYOUT: &'static str = "x86-64 user_regs_struct";

    fn fill_state(&self, state: &mut PlatformState<X86_64>)
    {
        let regs = state.x86_mut();
        for (n, value) in self.gprs().into_iter().enumerate() {
            regs.set_gpr(n, value);
        }
        for (seg, value) in SegmentRegister::ALL.into_iter().zip(self.segments()) {
            regs.set_segment(seg, value as u16);
        }
        regs.set_orig_ax(self.orig_rax);
        regs.set_instruction_pointer(self.rip);
        regs.set_flags(self.eflags);
        regs.set_segment_bases(self.fs_base, self.gs_base);
        regs.filled = true;

        debug!(rip = self.rip, "loaded {}", Self::LAYOUT);
    }

    fn fill_raw(&mut self, state: &PlatformState<X86_64>)
    {
        let regs = state.x86();
        for (n, field) in self.gprs_mut().into_iter().enumerate() {
            *field = regs.gpr(n);
        }
        // Only the low 16 bits hold the selector
        for (seg, field) in SegmentRegister::ALL.into_iter().zip(self.segments_mut()) {
            *field = (*field & !0xffff) | u64::from(regs.segment(seg));
        }
        self.orig_rax = regs.orig_ax();
        self.rip = regs.instruction_pointer();
        self.eflags = regs.flags();
        if regs.bases_filled {
            self.fs_base = regs.fs_base();
            self.gs_base = regs.gs_base();
        }

        debug!(rsp = regs.gpr(Gpr::Sp.index()), "stored {}", Self::LAYOUT);
    }
}

impl RawSnapshot<X86_64> for UserFpRegsX86_64
{
    const LAYOUT: &'static str = "x86-64 user_fpregs_struct";

    fn fill_state(&self, state: &mut PlatformState<X86_64>)
    {
        let x87 = state.x87_mut();
        x87.control_word = self.cwd;
        x87.status_word = self.swd;
        x87.op_code = self.fop;
        x87.inst_ptr_offset = self.rip;
        x87.data_ptr_offset = self.rdp;
        x87.inst_ptr_selector = 0;
        x87.data_ptr_selector = 0;

        // Registers go in before the tag word: restoring it reads them.
        load_st_space(state, bytemuck::bytes_of(&self.st_space), 16);
        let x87 = state.x87_mut();
        x87.tag_word = x87.restore_tag_word(self.ftw as u8);
        x87.filled = true;
        x87.op_code_filled = true;

        load_xmm_space(state, bytemuck::bytes_of(&self.xmm_space), X86_64::XMM_REG_COUNT);
        let avx = state.avx_mut();
        avx.mxcsr = self.mxcsr;
        avx.mxcsr_mask = self.mxcr_mask;
        avx.xmm_filled = true;
        avx.mxcsr_mask_filled = true;

        debug!(tag_word = state.x87().tag_word, "loaded {}", Self::LAYOUT);
    }

    fn fill_raw(&mut self, state: &PlatformState<X86_64>)
    {
        let x87 = state.x87();
        self.cwd = x87.control_word;
        self.swd = x87.status_word;
        self.ftw = (self.ftw & 0xff00) | u16::from(x87.abridged_tag_word());
        if x87.op_code_filled {
            self.fop = x87.op_code;
        }
        self.rip = x87.inst_ptr_offset;
        self.rdp = x87.data_ptr_offset;
        store_st_space(state, bytemuck::bytes_of_mut(&mut self.st_space), 16);

        let avx = state.avx();
        store_xmm_space(state, bytemuck::bytes_of_mut(&mut self.xmm_space), X86_64::XMM_REG_COUNT);
        self.mxcsr = avx.mxcsr;
        if avx.mxcsr_mask_filled {
            self.mxcr_mask = avx.mxcsr_mask;
        }

        debug!("stored {}", Self::LAYOUT);
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
impl From<libc::user_regs_struct> for UserRegsX86_64
{
    fn from(r: libc::user_regs_struct) -> Self
    {
        Self {
            r15: r.r15,
            r14: r.r14,
            r13: r.r13,
            r12: r.r12,
            rbp: r.rbp,
            rbx: r.rbx,
            r11: r.r11,
            r10: r.r10,
            r9: r.r9,
            r8: r.r8,
            rax: r.rax,
            rcx: r.rcx,
            rdx: r.rdx,
            rsi: r.rsi,
            rdi: r.rdi,
            orig_rax: r.orig_rax,
            rip: r.rip,
            cs: r.cs,
            eflags: r.eflags,
            rsp: r.rsp,
            ss: r.ss,
            fs_base: r.fs_base,
            gs_base: r.gs_base,
            ds: r.ds,
            es: r.es,
            fs: r.fs,
            gs: r.gs,
        }
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
impl From<UserRegsX86_64> for libc::user_regs_struct
{
    fn from(r: UserRegsX86_64) -> Self
    {
        Self {
            r15: r.r15,
            r14: r.r14,
            r13: r.r13,
            r12: r.r12,
            rbp: r.rbp,
            rbx: r.rbx,
            r11: r.r11,
            r10: r.r10,
            r9: r.r9,
            r8: r.r8,
            rax: r.rax,
            rcx: r.rcx,
            rdx: r.rdx,
            rsi: r.rsi,
            rdi: r.rdi,
            orig_rax: r.orig_rax,
            rip: r.rip,
            cs: r.cs,
            eflags: r.eflags,
            rsp: r.rsp,
            ss: r.ss,
            fs_base: r.fs_base,
            gs_base: r.gs_base,
            ds: r.ds,
            es: r.es,
            fs: r.fs,
            gs: r.gs,
        }
    }
}
