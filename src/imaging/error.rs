// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DftError {
    #[error("A visibility row has channel {channel}, but the image only has {nchan} channels")]
    ChannelOutOfRange { channel: usize, nchan: usize },
}
