//! The one concrete half of the context-switch primitive §1 and §4.1 treat
//! as an external collaborator: swapping the callee-saved registers and
//! stack pointer between two kernel-resident stacks.
//!
//! Register set and order are the teacher's `CpuContext`
//! (`sched/context.rs`): `r15, r14, r13, r12, rbp, rbx`, stack-resident
//! here rather than copied into a struct, matching the push/pop frame
//! [`crate::process`] constructs for a brand-new process.
//!
//! What this module does NOT attempt is unifying first-entry (a plain
//! `ret` onto a fabricated frame) with mid-syscall resumption (an `iretq`
//! onto the CPU-pushed trap frame) behind one call site — reconciling the
//! two is exactly the "assumed" part of the primitive the spec leaves to
//! an external collaborator, and is called out as an open point in
//! `DESIGN.md` rather than papered over here.

/// Saves the callee-saved registers and current `rsp` to `*old_sp`, then
/// loads `rsp` from `new_sp` and restores that stack's callee-saved
/// registers before returning — control resumes wherever `new_sp`'s stack
/// was left off the last time it ran through this same function (or, for a
/// never-yet-run process, at the fabricated frame `process::sys_create`
/// built).
///
/// # Safety
/// `old_sp` must point to a valid, writable `usize`; `new_sp` must be a
/// stack pointer previously produced either by this function's own save
/// half or by [`crate::process`]'s initial-frame construction.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_to(old_sp: *mut usize, new_sp: usize) {
    core::arch::naked_asm!(
        "push rbx",
        "push rbp",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbp",
        "pop rbx",
        "ret",
    )
}
