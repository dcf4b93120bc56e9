use super::*;

fn two_by_one() -> FrameRGB {
    FrameRGB {
        width: 2,
        height: 1,
        data: vec![1, 2, 3, 4, 5, 6],
    }
}

#[test]
fn pixel_reads_row_major_rgb() {
    let f = two_by_one();
    assert_eq!(f.pixel(0, 0), Some([1, 2, 3]));
    assert_eq!(f.pixel(1, 0), Some([4, 5, 6]));
}

#[test]
fn pixel_outside_the_frame_is_none() {
    let f = two_by_one();
    assert_eq!(f.pixel(2, 0), None);
    assert_eq!(f.pixel(0, 1), None);

    let short = FrameRGB {
        data: vec![1, 2, 3],
        ..two_by_one()
    };
    assert_eq!(short.pixel(1, 0), None);
}
