//! End-to-end scenarios over a 200-block / 56-inode / `C = 4` volume, the
//! configuration used throughout the component design.

use sofs14::{
    format_volume,
    layout::{Credentials, InodeKind},
    Error, ExpectedStatus, LinkOp, UnlinkOp,
};

fn fresh_volume() -> sofs14::Volume<std::fs::File> {
    let file = tempfile::tempfile().unwrap();
    file.set_len(200 * 512).unwrap();
    format_volume(file, 56).unwrap()
}

#[test]
fn create_tree_and_check_structure() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;

    vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();
    vol.create_dir_entry(0, b"testVec", InodeKind::File, 0o644, cred).unwrap();
    let new_d = vol.create_dir_entry(0, b"new", InodeKind::Dir, 0o755, cred).unwrap();
    let new_again = vol.create_dir_entry(new_d, b"newAgain", InodeKind::Dir, 0o755, cred).unwrap();

    assert!(vol.dir_entry_by_name(0, b"ex", cred).is_ok());
    assert!(vol.dir_entry_by_name(0, b"testVec", cred).is_ok());
    assert!(vol.dir_entry_by_name(0, b"new", cred).is_ok());
    assert!(vol.dir_entry_by_name(new_d, b"newAgain", cred).is_ok());

    let new_again_inode = vol.read_inode(new_again, ExpectedStatus::InUse).unwrap();
    assert_eq!(new_again_inode.ref_count, 2);
}

#[test]
fn ten_files_fit_in_one_directory_cluster() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    let ex = vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();

    for i in 1..=10 {
        let name = format!("ex{i}.sh");
        vol.create_dir_entry(ex, name.as_bytes(), InodeKind::File, 0o644, cred).unwrap();
    }

    let ex_inode = vol.read_inode(ex, ExpectedStatus::InUse).unwrap();
    assert_eq!(ex_inode.clu_count, 1);
    assert_eq!(ex_inode.size, sofs14::layout::DIR_CONTENT_SIZE as u64);
}

#[test]
fn hard_link_shares_inode_number() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    let ex = vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();
    let new_d = vol.create_dir_entry(0, b"new", InodeKind::Dir, 0o755, cred).unwrap();
    let new_again = vol.create_dir_entry(new_d, b"newAgain", InodeKind::Dir, 0o755, cred).unwrap();
    let ex10 = vol.create_dir_entry(ex, b"ex10.sh", InodeKind::File, 0o644, cred).unwrap();

    vol.add_attach_dir_entry(new_again, b"sameAsEx10.sh", ex10, LinkOp::Add).unwrap();

    let inode = vol.read_inode(ex10, ExpectedStatus::InUse).unwrap();
    assert_eq!(inode.ref_count, 2);

    let (_, a) = vol.dir_entry_by_path(b"/ex/ex10.sh", cred).unwrap();
    let (_, b) = vol.dir_entry_by_path(b"/new/newAgain/sameAsEx10.sh", cred).unwrap();
    assert_eq!(a, ex10);
    assert_eq!(b, ex10);
}

#[test]
fn relative_symlink_resolves_through_parent_dotdot() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    let ex = vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();
    let ex5 = vol.create_dir_entry(ex, b"ex5.sh", InodeKind::File, 0o644, cred).unwrap();
    let new_d = vol.create_dir_entry(0, b"new", InodeKind::Dir, 0o755, cred).unwrap();
    let new_again = vol.create_dir_entry(new_d, b"newAgain", InodeKind::Dir, 0o755, cred).unwrap();

    let target = b"../../ex/ex5.sh";
    let link = vol.create_dir_entry(new_again, b"symlink1", InodeKind::Symlink, 0o777, cred).unwrap();
    vol.write_symlink_target(link, target).unwrap();

    let link_inode = vol.read_inode(link, ExpectedStatus::InUse).unwrap();
    assert_eq!(link_inode.mode().kind(), Some(InodeKind::Symlink));
    assert_eq!(link_inode.size, target.len() as u64);
    assert_eq!(link_inode.clu_count, 1);

    let (dir, entry) = vol.dir_entry_by_path(b"/new/newAgain/symlink1", cred).unwrap();
    assert_eq!(dir, ex);
    assert_eq!(entry, ex5);
}

#[test]
fn symlink_chain_of_two_is_eloop() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    let a = vol.create_dir_entry(0, b"a", InodeKind::Symlink, 0o777, cred).unwrap();
    vol.write_symlink_target(a, b"/b").unwrap();
    let b = vol.create_dir_entry(0, b"b", InodeKind::Symlink, 0o777, cred).unwrap();
    vol.write_symlink_target(b, b"/c").unwrap();
    vol.create_dir_entry(0, b"c", InodeKind::File, 0o644, cred).unwrap();

    assert_eq!(vol.dir_entry_by_path(b"/a", cred), Err(Error::Eloop));
}

#[test]
fn rem_with_surviving_hard_link_marks_entry_deleted_not_freed() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    let ex = vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();
    let new_d = vol.create_dir_entry(0, b"new", InodeKind::Dir, 0o755, cred).unwrap();
    let new_again = vol.create_dir_entry(new_d, b"newAgain", InodeKind::Dir, 0o755, cred).unwrap();
    let ex10 = vol.create_dir_entry(ex, b"ex10.sh", InodeKind::File, 0o644, cred).unwrap();
    vol.add_attach_dir_entry(new_again, b"sameAsEx10.sh", ex10, LinkOp::Add).unwrap();

    vol.rem_detach_dir_entry(ex, b"ex10.sh", UnlinkOp::Rem).unwrap();

    let inode = vol.read_inode(ex10, ExpectedStatus::InUse).unwrap();
    assert_eq!(inode.ref_count, 1);
    assert_eq!(vol.dir_entry_by_name(ex, b"ex10.sh", cred), Err(Error::Enoent));

    // still reachable via the surviving hard link
    let (_, entry) = vol.dir_entry_by_path(b"/new/newAgain/sameAsEx10.sh", cred).unwrap();
    assert_eq!(entry, ex10);

    // a fresh name in /ex is still creatable after the DELETED slot
    vol.create_dir_entry(ex, b"ex11.sh", InodeKind::File, 0o644, cred).unwrap();
    assert!(vol.dir_entry_by_name(ex, b"ex11.sh", cred).is_ok());
}

#[test]
fn unmount_then_remount_preserves_tree() {
    let mut vol = fresh_volume();
    let cred = Credentials::ROOT;
    vol.create_dir_entry(0, b"ex", InodeKind::Dir, 0o755, cred).unwrap();
    let backend = vol.unmount_and_take_backend().unwrap();

    let mut vol2 = sofs14::Volume::mount(backend, true).unwrap();
    assert!(vol2.dir_entry_by_name(0, b"ex", cred).is_ok());
}
