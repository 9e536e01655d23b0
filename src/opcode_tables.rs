//! Static opcode metadata, version-aware
//!
//! One flat lookup per operand-count class. Each entry says what the
//! decoder needs to know before it can finish reading the instruction:
//! the mnemonic, whether a store byte follows, whether branch bytes follow,
//! and whether inline text follows. Slots that the standard reuses across
//! versions are resolved here, so the decoder and dispatcher never need
//! their own version checks for them.

use crate::instruction::OperandCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub stores: bool,
    pub branches: bool,
    pub text: bool,
}

const fn op(name: &'static str, stores: bool, branches: bool) -> OpcodeInfo {
    OpcodeInfo {
        name,
        stores,
        branches,
        text: false,
    }
}

const fn op_text(name: &'static str) -> OpcodeInfo {
    OpcodeInfo {
        name,
        stores: false,
        branches: false,
        text: true,
    }
}

/// Metadata for an opcode in the given class, or `None` when the slot is
/// not defined for this story version.
pub fn opcode_info(count: OperandCount, opcode: u8, version: u8) -> Option<OpcodeInfo> {
    match count {
        OperandCount::OP0 => zero_op_info(opcode, version),
        OperandCount::OP1 => one_op_info(opcode, version),
        OperandCount::OP2 => two_op_info(opcode, version),
        OperandCount::VAR => var_op_info(opcode, version),
    }
}

fn two_op_info(opcode: u8, version: u8) -> Option<OpcodeInfo> {
    let info = match opcode {
        0x01 => op("je", false, true),
        0x02 => op("jl", false, true),
        0x03 => op("jg", false, true),
        0x04 => op("dec_chk", false, true),
        0x05 => op("inc_chk", false, true),
        0x06 => op("jin", false, true),
        0x07 => op("test", false, true),
        0x08 => op("or", true, false),
        0x09 => op("and", true, false),
        0x0a => op("test_attr", false, true),
        0x0b => op("set_attr", false, false),
        0x0c => op("clear_attr", false, false),
        0x0d => op("store", false, false),
        0x0e => op("insert_obj", false, false),
        0x0f => op("loadw", true, false),
        0x10 => op("loadb", true, false),
        0x11 => op("get_prop", true, false),
        0x12 => op("get_prop_addr", true, false),
        0x13 => op("get_next_prop", true, false),
        0x14 => op("add", true, false),
        0x15 => op("sub", true, false),
        0x16 => op("mul", true, false),
        0x17 => op("div", true, false),
        0x18 => op("mod", true, false),
        0x19 if version >= 4 => op("call_2s", true, false),
        0x1a if version >= 5 => op("call_2n", false, false),
        0x1b if version >= 5 => op("set_colour", false, false),
        0x1c if version >= 5 => op("throw", false, false),
        _ => return None,
    };
    Some(info)
}

fn one_op_info(opcode: u8, version: u8) -> Option<OpcodeInfo> {
    let info = match opcode {
        0x00 => op("jz", false, true),
        0x01 => op("get_sibling", true, true),
        0x02 => op("get_child", true, true),
        0x03 => op("get_parent", true, false),
        0x04 => op("get_prop_len", true, false),
        0x05 => op("inc", false, false),
        0x06 => op("dec", false, false),
        0x07 => op("print_addr", false, false),
        0x08 if version >= 4 => op("call_1s", true, false),
        0x09 => op("remove_obj", false, false),
        0x0a => op("print_obj", false, false),
        0x0b => op("ret", false, false),
        0x0c => op("jump", false, false),
        0x0d => op("print_paddr", false, false),
        0x0e => op("load", true, false),
        // Slot reused: bitwise not through V4, call_1n from V5
        0x0f if version <= 4 => op("not", true, false),
        0x0f => op("call_1n", false, false),
        _ => return None,
    };
    Some(info)
}

fn zero_op_info(opcode: u8, version: u8) -> Option<OpcodeInfo> {
    let info = match opcode {
        0x00 => op("rtrue", false, false),
        0x01 => op("rfalse", false, false),
        0x02 => op_text("print"),
        0x03 => op_text("print_ret"),
        0x04 => op("nop", false, false),
        // save/restore branch through V3, store in V4, move to EXT in V5
        0x05 if version <= 3 => op("save", false, true),
        0x05 if version == 4 => op("save", true, false),
        0x06 if version <= 3 => op("restore", false, true),
        0x06 if version == 4 => op("restore", true, false),
        0x07 => op("restart", false, false),
        0x08 => op("ret_popped", false, false),
        // Slot reused: pop through V4, catch from V5
        0x09 if version <= 4 => op("pop", false, false),
        0x09 => op("catch", true, false),
        0x0a => op("quit", false, false),
        0x0b => op("new_line", false, false),
        0x0c if version == 3 => op("show_status", false, false),
        0x0d if version >= 3 => op("verify", false, true),
        // 0x0e is the extended-form marker byte, never dispatched
        0x0f if version >= 5 => op("piracy", false, true),
        _ => return None,
    };
    Some(info)
}

fn var_op_info(opcode: u8, version: u8) -> Option<OpcodeInfo> {
    let info = match opcode {
        0x00 => op(if version >= 4 { "call_vs" } else { "call" }, true, false),
        0x01 => op("storew", false, false),
        0x02 => op("storeb", false, false),
        0x03 => op("put_prop", false, false),
        0x04 if version <= 4 => op("sread", false, false),
        0x04 => op("aread", true, false),
        0x05 => op("print_char", false, false),
        0x06 => op("print_num", false, false),
        0x07 => op("random", true, false),
        0x08 => op("push", false, false),
        0x09 if version == 6 => op("pull", true, false),
        0x09 => op("pull", false, false),
        0x0a if version >= 3 => op("split_window", false, false),
        0x0b if version >= 3 => op("set_window", false, false),
        0x0c if version >= 4 => op("call_vs2", true, false),
        0x0d if version >= 4 => op("erase_window", false, false),
        0x0e if version >= 4 => op("erase_line", false, false),
        0x0f if version >= 4 => op("set_cursor", false, false),
        0x10 if version >= 4 => op("get_cursor", false, false),
        0x11 if version >= 4 => op("set_text_style", false, false),
        0x12 if version >= 4 => op("buffer_mode", false, false),
        0x13 if version >= 3 => op("output_stream", false, false),
        0x14 if version >= 3 => op("input_stream", false, false),
        0x15 if version >= 3 => op("sound_effect", false, false),
        0x16 if version >= 4 => op("read_char", true, false),
        0x17 if version >= 4 => op("scan_table", true, true),
        0x18 if version >= 5 => op("not", true, false),
        0x19 if version >= 5 => op("call_vn", false, false),
        0x1a if version >= 5 => op("call_vn2", false, false),
        0x1b if version >= 5 => op("tokenise", false, false),
        0x1c if version >= 5 => op("encode_text", false, false),
        0x1d if version >= 5 => op("copy_table", false, false),
        0x1e if version >= 5 => op("print_table", false, false),
        0x1f if version >= 5 => op("check_arg_count", false, true),
        _ => return None,
    };
    Some(info)
}

/// Metadata for the extended (EXT) opcode set, V5 and later
pub fn ext_opcode_info(opcode: u8, version: u8) -> Option<OpcodeInfo> {
    if version < 5 {
        return None;
    }
    let info = match opcode {
        0x00 => op("save", true, false),
        0x01 => op("restore", true, false),
        0x02 => op("log_shift", true, false),
        0x03 => op("art_shift", true, false),
        0x04 => op("set_font", true, false),
        0x05 if version >= 6 => op("draw_picture", false, false),
        0x06 if version >= 6 => op("picture_data", false, true),
        0x07 if version >= 6 => op("erase_picture", false, false),
        0x08 if version >= 6 => op("set_margins", false, false),
        0x09 => op("save_undo", true, false),
        0x0a => op("restore_undo", true, false),
        0x0b => op("print_unicode", false, false),
        0x0c => op("check_unicode", true, false),
        0x10 if version >= 6 => op("move_window", false, false),
        0x11 if version >= 6 => op("window_size", false, false),
        0x12 if version >= 6 => op("window_style", false, false),
        0x13 if version >= 6 => op("get_wind_prop", true, false),
        0x14 if version >= 6 => op("scroll_window", false, false),
        0x15 if version >= 6 => op("pop_stack", false, false),
        0x16 if version >= 6 => op("read_mouse", false, false),
        0x17 if version >= 6 => op("mouse_window", false, false),
        0x18 if version >= 6 => op("push_stack", false, true),
        0x19 if version >= 6 => op("put_wind_prop", false, false),
        0x1a if version >= 6 => op("print_form", false, false),
        0x1b if version >= 6 => op("make_menu", false, true),
        0x1c if version >= 6 => op("picture_table", false, false),
        _ => return None,
    };
    Some(info)
}

/// call_vs2 and call_vn2 carry two operand-type bytes (up to 8 operands)
pub fn takes_double_type_byte(opcode: u8) -> bool {
    opcode == 0x0c || opcode == 0x1a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_not_with_call_1n() {
        assert_eq!(opcode_info(OperandCount::OP1, 0x0f, 3).unwrap().name, "not");
        assert!(opcode_info(OperandCount::OP1, 0x0f, 4).unwrap().stores);
        let v5 = opcode_info(OperandCount::OP1, 0x0f, 5).unwrap();
        assert_eq!(v5.name, "call_1n");
        assert!(!v5.stores);
    }

    #[test]
    fn overlay_replaces_pop_with_catch() {
        assert_eq!(opcode_info(OperandCount::OP0, 0x09, 4).unwrap().name, "pop");
        let v5 = opcode_info(OperandCount::OP0, 0x09, 5).unwrap();
        assert_eq!(v5.name, "catch");
        assert!(v5.stores);
    }

    #[test]
    fn save_changes_shape_across_versions() {
        let v3 = opcode_info(OperandCount::OP0, 0x05, 3).unwrap();
        assert!(v3.branches && !v3.stores);
        let v4 = opcode_info(OperandCount::OP0, 0x05, 4).unwrap();
        assert!(v4.stores && !v4.branches);
        assert!(opcode_info(OperandCount::OP0, 0x05, 5).is_none());
        let ext = ext_opcode_info(0x00, 5).unwrap();
        assert_eq!(ext.name, "save");
        assert!(ext.stores);
    }

    #[test]
    fn version_gates_bound_both_ends() {
        // show_status exists only in V3
        assert!(opcode_info(OperandCount::OP0, 0x0c, 3).is_some());
        assert!(opcode_info(OperandCount::OP0, 0x0c, 4).is_none());
        // sread does not store, aread does
        assert!(!opcode_info(OperandCount::VAR, 0x04, 4).unwrap().stores);
        assert!(opcode_info(OperandCount::VAR, 0x04, 5).unwrap().stores);
        // EXT table absent before V5
        assert!(ext_opcode_info(0x02, 4).is_none());
        assert!(ext_opcode_info(0x02, 5).is_some());
        // V6-only EXT slots stay hidden in V5
        assert!(ext_opcode_info(0x10, 5).is_none());
        assert!(ext_opcode_info(0x10, 6).is_some());
    }

    #[test]
    fn branch_and_store_flags_match_shape() {
        let je = opcode_info(OperandCount::OP2, 0x01, 3).unwrap();
        assert!(je.branches && !je.stores);
        let add = opcode_info(OperandCount::OP2, 0x14, 3).unwrap();
        assert!(add.stores && !add.branches);
        let get_sibling = opcode_info(OperandCount::OP1, 0x01, 3).unwrap();
        assert!(get_sibling.stores && get_sibling.branches);
        let print = opcode_info(OperandCount::OP0, 0x02, 3).unwrap();
        assert!(print.text);
    }
}
